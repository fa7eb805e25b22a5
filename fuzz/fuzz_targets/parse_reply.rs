// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use filewizard::enrichment::response::{extract_json_object, parse_files};
use filewizard::enrichment::{FileMove, SearchHit};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(reply) = std::str::from_utf8(data) else {
        return;
    };

    if let Some(object) = extract_json_object(reply) {
        assert!(object.starts_with('{') && object.ends_with('}'));
    }
    let _ = parse_files::<FileMove>(reply);
    let _ = parse_files::<SearchHit>(reply);
});
