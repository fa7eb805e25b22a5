// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Credential rotation

use std::sync::Mutex;

/// Ordered API keys with a cursor that moves forward once per failed attempt
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<String>,
    cursor: Mutex<usize>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<String>) -> Self {
        Self {
            credentials,
            cursor: Mutex::new(0),
        }
    }

    /// Credential the next attempt should use; `None` when the pool is empty
    pub fn current(&self) -> Option<String> {
        if self.credentials.is_empty() {
            return None;
        }
        let cursor = *self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        Some(self.credentials[cursor % self.credentials.len()].clone())
    }

    /// Move to the next credential
    pub fn advance(&self) {
        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        *cursor = cursor.wrapping_add(1);
    }
}
