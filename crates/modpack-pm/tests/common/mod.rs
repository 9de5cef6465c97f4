//! Shared fixtures: an in-memory transport and a small fake registry.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use modpack_pm::http::{HttpError, Transport};
use modpack_pm::PackConfig;
use serde_json::{json, Value};

pub const API: &str = "https://registry.test/api";
pub const ADDON_INDEX: &str =
    "https://registry.test/api/addon/?mods=1&property=id,name,summary,websiteURL,packageType,categorySection.path";
pub const LOADER_INDEX: &str = "https://loader.test/forge/json";
pub const LOADER_URL: &str =
    "https://loader.test/maven/1.12.2-14.23.5.2768/forge-1.12.2-14.23.5.2768-installer.jar";

/// Serves a fixed URL map and counts what was asked for
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, Vec<u8>>>,
    gets: AtomicUsize,
    downloads: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.routes.lock().unwrap().insert(url.to_string(), body.into());
    }

    pub fn serve_json(&self, url: &str, value: &Value) {
        self.serve(url, serde_json::to_vec(value).unwrap());
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn body(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        self.routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| HttpError::HttpStatus { status: 404, url: url.to_string() })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.body(url)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, HttpError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let body = self.body(url)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, &body)?;
        Ok(body.len() as u64)
    }
}

/// A registry file for 1.12.2. `deps` are `(addon id, wire type)` pairs.
pub fn file(id: u64, name: &str, date: &str, deps: &[(u64, u8)]) -> Value {
    json!({
        "id": id,
        "fileName": name,
        "fileNameOnDisk": name,
        "fileDate": date,
        "releaseType": 1,
        "gameVersion": ["1.12.2"],
        "dependencies": deps.iter().map(|(addon, kind)| json!({"addOnId": addon, "type": kind})).collect::<Vec<_>>(),
        "downloadURL": format!("https://files.test/{}/{}", id, name)
    })
}

/// Publish addons with their files, plus the loader index and installer
pub fn install_registry(transport: &MockTransport, addons: &[(u64, &str, Vec<Value>)]) {
    let index: Vec<Value> = addons
        .iter()
        .map(|(id, name, _)| json!({"id": id, "name": name, "summary": format!("{} summary", name), "packageType": 6}))
        .collect();
    transport.serve_json(ADDON_INDEX, &Value::Array(index));

    for (id, _, files) in addons {
        transport.serve_json(&format!("{}/addon/{}/files", API, id), &Value::Array(files.clone()));
        for file in files {
            let url = file["downloadURL"].as_str().unwrap();
            transport.serve(url, format!("jar:{}", file["fileName"].as_str().unwrap()));
        }
    }

    transport.serve_json(
        LOADER_INDEX,
        &json!({
            "webpath": "https://loader.test/maven",
            "promos": {"1.12.2-recommended": 2768},
            "branches": {},
            "mcversion": {"1.12.2": [2768]},
            "number": {"2768": {"mcversion": "1.12.2", "version": "14.23.5.2768", "branch": null}}
        }),
    );
    transport.serve(LOADER_URL, "installer");
}

/// Pack config rooted in `root`, talking to the fake registry
pub fn pack_config(root: &Path, extra: Value) -> PackConfig {
    let mut value = json!({
        "name": "test",
        "game_version": "1.12.2",
        "loader_version": "recommended",
        "output": root.join("out"),
        "cache_dir": root.join("cache"),
        "local_base": root,
        "provider_settings": {
            "curse": {"api_url": API},
            "loader": {"index_url": LOADER_INDEX}
        },
        "mods": []
    });
    if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
        for (key, v) in extra {
            base.insert(key.clone(), v.clone());
        }
    }
    serde_json::from_value(value).unwrap()
}
