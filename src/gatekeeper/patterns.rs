// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Coarse attack-signature filter.
//!
//! Runs over `url | body | headers-json`. False positives are accepted;
//! handlers still validate their own input.

use axum::http::{HeaderMap, Uri};
use regex::RegexSet;
use serde_json::{Map, Value};

/// Signatures checked against every request, all case-insensitive.
const SIGNATURES: &[(&str, &str)] = &[
    ("path_traversal", r"\.\./"),
    ("template_injection", r"\{\{.*\}\}"),
    ("script_tag", r"<script[\s>]"),
    ("sql_keyword", r"\b(union|select|insert|update|delete|drop)\s+"),
];

/// Pre-compiled signature set.
#[derive(Debug, Clone)]
pub struct SuspiciousPatternFilter {
    set: RegexSet,
}

impl SuspiciousPatternFilter {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = SIGNATURES.iter().map(|(_, p)| format!("(?i){p}"));
        Ok(Self {
            set: RegexSet::new(patterns)?,
        })
    }

    /// Names of the signatures matching `input`.
    pub fn matches(&self, input: &str) -> Vec<&'static str> {
        self.set
            .matches(input)
            .into_iter()
            .map(|i| SIGNATURES[i].0)
            .collect()
    }

    pub fn is_suspicious(&self, input: &str) -> bool {
        self.set.is_match(input)
    }

    /// Inspect a request. Returns the first matching signature name.
    ///
    /// The URL is checked both raw and with its query pairs percent-decoded,
    /// so `?path=%2e%2e%2f` still hits the traversal signature.
    pub fn inspect(&self, uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Option<&'static str> {
        let combined = combined_input(uri, headers, body);
        self.matches(&combined).into_iter().next()
    }
}

/// Build the `url|body|headers` string that the signatures run against.
///
/// Headers are serialized as a JSON object so values are quoted; a header
/// value of `DELETE` is never followed by whitespace.
pub fn combined_input(uri: &Uri, headers: &HeaderMap, body: &[u8]) -> String {
    let mut url = uri.to_string();
    if let Some(query) = uri.query() {
        let decoded: Vec<String> = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        url.push(' ');
        url.push_str(&decoded.join("&"));
    }

    let body = String::from_utf8_lossy(body);

    let header_map: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            (name.as_str().to_string(), Value::String(value))
        })
        .collect();
    let headers_json = Value::Object(header_map).to_string();

    format!("{url}|{body}|{headers_json}")
}
