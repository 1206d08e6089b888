//! Settings persistence: bulk (name, value) string pairs behind a REST JSON
//! endpoint of the hosted database, plus an in-memory store for tests. Field
//! names are opaque to this module; typed accessors default on parse failure
//! instead of failing the caller.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Setting {
    pub name: String,
    pub value: String,
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<Setting>>;
    async fn upsert_all(&self, rows: &[Setting]) -> Result<()>;
}

/// REST-backed store: one table of string pairs, read in bulk and upserted in
/// bulk keyed by name.
pub struct RestSettingsStore {
    base: String,
    api_key: String,
    http: reqwest::Client,
}

impl RestSettingsStore {
    pub fn new(base: &str, api_key: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/settings", self.base)
    }
}

#[async_trait]
impl SettingsStore for RestSettingsStore {
    async fn fetch_all(&self) -> Result<Vec<Setting>> {
        let resp = self
            .http
            .get(format!("{}?select=name,value", self.table_url()))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("settings read failed: HTTP {}", resp.status()));
        }
        Ok(resp.json::<Vec<Setting>>().await?)
    }

    async fn upsert_all(&self, rows: &[Setting]) -> Result<()> {
        let resp = self
            .http
            .post(self.table_url())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "resolution=merge-duplicates")
            .json(rows)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("settings upsert failed: HTTP {}", resp.status()));
        }
        Ok(())
    }
}

/// In-memory store used by tests.
#[derive(Default)]
pub struct MemorySettingsStore {
    rows: RwLock<BTreeMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, rows: &[(&str, &str)]) {
        let mut map = self.rows.write();
        for (name, value) in rows {
            map.insert(name.to_string(), value.to_string());
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn fetch_all(&self) -> Result<Vec<Setting>> {
        Ok(self
            .rows
            .read()
            .iter()
            .map(|(name, value)| Setting { name: name.clone(), value: value.clone() })
            .collect())
    }

    async fn upsert_all(&self, rows: &[Setting]) -> Result<()> {
        let mut map = self.rows.write();
        for row in rows {
            map.insert(row.name.clone(), row.value.clone());
        }
        Ok(())
    }
}

/// Name-indexed view with defaulting typed accessors.
#[derive(Debug, Clone, Default)]
pub struct SettingsMap(BTreeMap<String, String>);

impl SettingsMap {
    pub fn from_rows(rows: Vec<Setting>) -> Self {
        Self(rows.into_iter().map(|s| (s.name, s.value)).collect())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }

    /// Parse failure or absence falls back to the default rather than
    /// surfacing an error to the caller.
    pub fn get_i64_or(&self, name: &str, default: i64) -> i64 {
        self.get(name).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
    }

    pub fn get_bool_or(&self, name: &str, default: bool) -> bool {
        match self.get(name).map(|v| v.trim().to_lowercase()) {
            Some(v) if v == "true" => true,
            Some(v) if v == "false" => false,
            _ => default,
        }
    }
}
