// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Token-bounded batching of summaries for downstream requests

use serde::Serialize;

use crate::Result;

/// Items that go out together in one request
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    pub items: Vec<T>,
    /// Sum of the items' approximate token counts
    pub approx_size: usize,
}

impl<T> Batch<T> {
    fn empty() -> Self {
        Self { items: Vec::new(), approx_size: 0 }
    }
}

/// Rough token count: serialized JSON bytes / 4
pub fn approx_tokens<T: Serialize>(item: &T) -> Result<usize> {
    Ok(serde_json::to_vec(item)?.len() / 4)
}

/// Group `items` greedily, in order, into batches under `max_tokens`.
///
/// A batch is closed as soon as the next item would bring it to the budget.
/// An item that alone reaches the budget gets a batch of its own; items are
/// never dropped or split.
pub fn plan<T: Serialize>(items: Vec<T>, max_tokens: usize) -> Result<Vec<Batch<T>>> {
    let mut batches = Vec::new();
    let mut current = Batch::empty();

    for item in items {
        let size = approx_tokens(&item)?;
        if !current.items.is_empty() && current.approx_size + size >= max_tokens {
            batches.push(std::mem::replace(&mut current, Batch::empty()));
        }
        current.approx_size += size;
        current.items.push(item);
    }

    if !current.items.is_empty() {
        batches.push(current);
    }
    Ok(batches)
}
