/// Integration tests for the pack pipeline
///
/// These drive whole packs through `Pipeline` against an in-memory transport
/// serving a small registry, a loader index and artifact bodies.

mod common;

use std::sync::Arc;

use common::{file, install_registry, pack_config, MockTransport, LOADER_INDEX};
use modpack_pm::downloader::sha256_hex;
use modpack_pm::feature::close_feature;
use modpack_pm::{
    run_batch, DependencyKind, Entry, ModpackError, PackResult, PackageType, Pipeline, Side, Transport,
};
use serde_json::json;
use tempfile::TempDir;

fn pipeline(transport: &Arc<MockTransport>, config: modpack_pm::PackConfig) -> Pipeline {
    let transport: Arc<dyn Transport> = transport.clone();
    Pipeline::new(config, transport).unwrap()
}

fn find<'a>(result: &'a PackResult, name: &str) -> &'a Entry {
    result
        .entries
        .iter()
        .find(|e| e.name.as_deref() == Some(name))
        .unwrap_or_else(|| panic!("no entry named {}", name))
}

fn mod_names(result: &PackResult) -> Vec<&str> {
    result
        .entries
        .iter()
        .filter(|e| e.package_type() == PackageType::Mod)
        .filter_map(|e| e.name.as_deref())
        .collect()
}

fn alpha_registry(transport: &MockTransport) {
    install_registry(
        transport,
        &[
            (
                1,
                "Alpha",
                vec![
                    file(100, "Alpha-0.9.jar", "2018-01-01T00:00:00Z", &[]),
                    file(101, "Alpha-1.0.jar", "2018-06-01T00:00:00Z", &[(2, 1), (3, 2)]),
                ],
            ),
            (2, "Beta", vec![file(201, "Beta-1.0.jar", "2018-02-01T00:00:00Z", &[])]),
            (3, "Gamma", vec![file(301, "Gamma-1.0.jar", "2018-02-01T00:00:00Z", &[])]),
        ],
    );
}

#[tokio::test]
async fn test_required_dependency_followed_optional_recorded_only() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    alpha_registry(&transport);

    let config = pack_config(temp.path(), json!({"mods": ["Alpha"]}));
    let result = pipeline(&transport, config).resolve().await.unwrap();

    assert_eq!(mod_names(&result), vec!["Alpha", "Beta"]);

    let alpha = find(&result, "Alpha");
    assert_eq!(alpha.depends[&DependencyKind::Required], vec!["Beta"]);
    assert_eq!(alpha.depends[&DependencyKind::Optional], vec!["Gamma"]);
    assert!(!alpha.transient);

    let beta = find(&result, "Beta");
    assert!(beta.transient);
    assert_eq!(beta.provides[&DependencyKind::Required], vec!["Alpha"]);
}

#[tokio::test]
async fn test_optional_dependencies_when_enabled() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    alpha_registry(&transport);

    let config = pack_config(temp.path(), json!({"mods": ["Alpha"], "download_optional": true}));
    let result = pipeline(&transport, config).resolve().await.unwrap();

    assert_eq!(mod_names(&result), vec!["Alpha", "Beta", "Gamma"]);
}

#[tokio::test]
async fn test_newest_matching_file_is_selected_deterministically() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    alpha_registry(&transport);

    let config = pack_config(temp.path(), json!({"mods": ["Alpha"]}));
    let pipeline = pipeline(&transport, config);

    for _ in 0..2 {
        let result = pipeline.resolve().await.unwrap();
        assert_eq!(find(&result, "Alpha").file_name.as_deref(), Some("Alpha-1.0.jar"));
    }
}

#[tokio::test]
async fn test_shared_dependency_of_client_and_server_mods_is_both() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    install_registry(
        &transport,
        &[
            (10, "ClientMod", vec![file(1001, "ClientMod.jar", "2018-01-01T00:00:00Z", &[(12, 1)])]),
            (11, "ServerMod", vec![file(1101, "ServerMod.jar", "2018-01-01T00:00:00Z", &[(12, 1)])]),
            (12, "Core", vec![file(1201, "Core.jar", "2018-01-01T00:00:00Z", &[])]),
        ],
    );

    let config = pack_config(
        temp.path(),
        json!({"mods": [
            {"name": "ClientMod", "side": "client"},
            {"name": "ServerMod", "side": "SERVER"}
        ]}),
    );
    let result = pipeline(&transport, config).resolve().await.unwrap();

    let cores: Vec<_> = result.entries.iter().filter(|e| e.name.as_deref() == Some("Core")).collect();
    assert_eq!(cores.len(), 1);
    assert_eq!(cores[0].side, Some(Side::Both));
    assert_eq!(cores[0].provides[&DependencyKind::Required], vec!["ClientMod", "ServerMod"]);

    assert_eq!(cores[0].path.as_deref(), Some("src/mods"));
    assert_eq!(find(&result, "ClientMod").path.as_deref(), Some("src/mods/_CLIENT"));
    assert_eq!(find(&result, "ServerMod").path.as_deref(), Some("src/mods/_SERVER"));
    assert_eq!(find(&result, "ServerMod").target_path.as_deref(), Some("mods/ServerMod.jar"));
}

#[tokio::test]
async fn test_late_server_dependent_widens_whole_chain() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    install_registry(
        &transport,
        &[
            (20, "Server", vec![file(2001, "Server.jar", "2018-01-01T00:00:00Z", &[(21, 1)])]),
            (21, "Lib", vec![file(2101, "Lib.jar", "2018-01-01T00:00:00Z", &[(22, 1)])]),
            (22, "Base", vec![file(2201, "Base.jar", "2018-01-01T00:00:00Z", &[])]),
        ],
    );

    // Lib is expanded (pulling in Base as client) before Server reaches it
    let config = pack_config(
        temp.path(),
        json!({"mods": [
            {"name": "Lib", "side": "client"},
            {"name": "Server", "side": "server"}
        ]}),
    );
    let result = pipeline(&transport, config).resolve().await.unwrap();

    assert_eq!(mod_names(&result), vec!["Lib", "Server", "Base"]);
    assert_eq!(find(&result, "Lib").side, Some(Side::Both));
    assert_eq!(find(&result, "Base").side, Some(Side::Both));
    assert_eq!(find(&result, "Base").path.as_deref(), Some("src/mods"));
    assert_eq!(find(&result, "Server").path.as_deref(), Some("src/mods/_SERVER"));
}

#[tokio::test]
async fn test_single_pass_leaves_second_level_dependencies() {
    let chain = |transport: &MockTransport| {
        install_registry(
            transport,
            &[
                (1, "A", vec![file(11, "A.jar", "2018-01-01T00:00:00Z", &[(2, 1)])]),
                (2, "B", vec![file(21, "B.jar", "2018-01-01T00:00:00Z", &[(3, 1)])]),
                (3, "C", vec![file(31, "C.jar", "2018-01-01T00:00:00Z", &[])]),
            ],
        )
    };

    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    chain(&transport);
    let fixed = pipeline(&transport, pack_config(temp.path(), json!({"mods": ["A"]})))
        .resolve()
        .await
        .unwrap();
    assert_eq!(mod_names(&fixed), vec!["A", "B", "C"]);

    let transport = MockTransport::new();
    chain(&transport);
    let single = pipeline(
        &transport,
        pack_config(temp.path(), json!({"mods": ["A"], "resolution": "single-pass"})),
    )
    .resolve()
    .await
    .unwrap();
    assert_eq!(mod_names(&single), vec!["A", "B"]);
    assert!(find(&single, "B").depends.is_empty());
}

#[tokio::test]
async fn test_feature_groups_selected_entry_with_its_dependencies() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    install_registry(
        &transport,
        &[
            (20, "Shaders", vec![file(2001, "Shaders.jar", "2018-01-01T00:00:00Z", &[(21, 1)])]),
            (21, "ShaderLib", vec![file(2101, "ShaderLib.jar", "2018-01-01T00:00:00Z", &[])]),
            (22, "Base", vec![file(2201, "Base.jar", "2018-01-01T00:00:00Z", &[])]),
        ],
    );

    let config = pack_config(
        temp.path(),
        json!({"mods": [
            "Base",
            {"name": "Shaders", "selected": false, "description": "Shader support", "recommendation": "starred"}
        ]}),
    );
    let result = pipeline(&transport, config).run().await.unwrap();

    assert_eq!(result.features.len(), 1);
    let feature = &result.features[0];
    assert_eq!(feature.name, "Shaders");
    assert!(!feature.selected);
    assert_eq!(feature.entry_refs, vec!["Shaders", "ShaderLib"]);

    let mut again = feature.clone();
    close_feature(&mut again, &result.entries);
    assert_eq!(again.entry_refs, feature.entry_refs);

    assert_eq!(find(&result, "ShaderLib").feature_name.as_deref(), Some("Shaders"));
    assert_eq!(find(&result, "Base").feature_name, None);

    let info = temp.path().join("out/test/src/mods/Shaders.jar.info.json");
    let info: serde_json::Value = serde_json::from_slice(&std::fs::read(info).unwrap()).unwrap();
    assert_eq!(info["feature"]["description"], "Shader support");
    assert_eq!(info["feature"]["recommendation"], "starred");
}

#[tokio::test]
async fn test_run_lays_out_tree_and_second_run_is_served_from_cache() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    alpha_registry(&transport);
    let config = pack_config(temp.path(), json!({"mods": ["Alpha"]}));
    let pack_root = temp.path().join("out/test");

    let first = pipeline(&transport, config.clone()).run().await.unwrap();
    assert_eq!(first.downloads.len(), 3);
    assert_eq!(first.from_cache(), 0);
    assert_eq!(transport.downloads(), 3);

    let alpha = pack_root.join("src/mods/Alpha-1.0.jar");
    let loader = pack_root.join("loaders/forge-1.12.2-14.23.5.2768-installer.jar");
    assert_eq!(std::fs::read(&alpha).unwrap(), b"jar:Alpha-1.0.jar");
    assert_eq!(std::fs::read(&loader).unwrap(), b"installer");
    assert_eq!(
        std::fs::read_to_string(pack_root.join("src/mods/Alpha-1.0.jar.url.txt")).unwrap(),
        "https://files.test/101/Alpha-1.0.jar"
    );

    let second = pipeline(&transport, config).run().await.unwrap();
    assert_eq!(transport.downloads(), 3);
    assert_eq!(second.from_cache(), 3);
    assert_eq!(std::fs::read(&alpha).unwrap(), b"jar:Alpha-1.0.jar");
    assert_eq!(std::fs::read(&loader).unwrap(), b"installer");
}

#[tokio::test]
async fn test_persisted_snapshot_avoids_registry_requests() {
    let temp = TempDir::new().unwrap();
    let settings = json!({
        "curse": {"api_url": common::API, "persist_snapshot": true},
        "loader": {"index_url": LOADER_INDEX}
    });
    let config = pack_config(temp.path(), json!({"mods": ["Alpha"], "provider_settings": settings}));

    let transport = MockTransport::new();
    alpha_registry(&transport);
    pipeline(&transport, config.clone()).run().await.unwrap();
    assert!(temp.path().join("cache/curse/snapshot.json").is_file());

    // Only the loader index is reachable now
    let offline = MockTransport::new();
    install_registry(&offline, &[]);
    let result = pipeline(&offline, config).run().await.unwrap();

    assert_eq!(mod_names(&result), vec!["Alpha", "Beta"]);
    assert_eq!(offline.gets(), 1);
    assert_eq!(offline.downloads(), 0);
}

#[tokio::test]
async fn test_cached_artifact_is_copied_without_network() {
    let temp = TempDir::new().unwrap();
    let url = "https://mirror.test/files/Extra.jar";

    let cached = temp.path().join("cache/direct").join(sha256_hex(url));
    std::fs::create_dir_all(&cached).unwrap();
    std::fs::write(cached.join("Extra.jar"), b"cached extra").unwrap();
    let loader = temp.path().join("cache/loader/1.12.2-14.23.5.2768");
    std::fs::create_dir_all(&loader).unwrap();
    std::fs::write(loader.join("forge-1.12.2-14.23.5.2768-installer.jar"), b"cached installer").unwrap();

    let transport = MockTransport::new();
    install_registry(&transport, &[]);
    let config = pack_config(temp.path(), json!({"mods": [{"url": url}]}));
    let result = pipeline(&transport, config).run().await.unwrap();

    assert_eq!(transport.downloads(), 0);
    assert!(result.downloads.iter().all(|d| d.from_cache));
    assert_eq!(
        std::fs::read(temp.path().join("out/test/src/mods/Extra.jar")).unwrap(),
        b"cached extra"
    );
    assert_eq!(find(&result, "Extra").url.as_deref(), Some(url));
}

#[tokio::test]
async fn test_unknown_mod_is_dropped_and_run_continues() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    alpha_registry(&transport);

    let config = pack_config(temp.path(), json!({"mods": ["Missing Mod", "Beta", 999]}));
    let result = pipeline(&transport, config).resolve().await.unwrap();

    assert_eq!(mod_names(&result), vec!["Beta"]);
}

#[tokio::test]
async fn test_local_files_are_copied_without_url_sidecar() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("extra")).unwrap();
    std::fs::write(temp.path().join("extra/local.jar"), b"local").unwrap();

    let transport = MockTransport::new();
    install_registry(&transport, &[]);
    let config = pack_config(temp.path(), json!({"mods": [{"file": "extra/local.jar", "side": "client"}]}));
    let result = pipeline(&transport, config).run().await.unwrap();

    let placed = temp.path().join("out/test/src/mods/_CLIENT/local.jar");
    assert_eq!(std::fs::read(&placed).unwrap(), b"local");
    assert!(!temp.path().join("out/test/src/mods/_CLIENT/local.jar.url.txt").exists());
    assert_eq!(find(&result, "local").target_path.as_deref(), Some("mods/local.jar"));
}

#[tokio::test]
async fn test_incomplete_entries_abort_the_pack() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    install_registry(&transport, &[]);

    let config = pack_config(temp.path(), json!({"mods": [{"url": "https://mirror.test/"}]}));
    let err = pipeline(&transport, config).resolve().await.unwrap_err();

    match err {
        ModpackError::MissingFields { stage, entries } => {
            assert_eq!(stage, "fill_information");
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].keys, vec!["name"]);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_batch_isolates_failing_packs() {
    let temp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    alpha_registry(&transport);

    let mut broken = pack_config(temp.path(), json!({"name": "broken", "mods": ["Alpha"]}));
    broken.loader_version = None;
    let good = pack_config(temp.path(), json!({"name": "good", "mods": ["Alpha"]}));

    let transport: Arc<dyn Transport> = transport;
    let outcomes = run_batch(vec![broken, good], transport, true).await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].name, "broken");
    assert!(matches!(outcomes[0].result, Err(ModpackError::InvalidConfig(_))));
    assert_eq!(outcomes[1].name, "good");
    let good = outcomes[1].result.as_ref().unwrap();
    assert!(good.downloads.is_empty());
    assert_eq!(mod_names(good), vec!["Alpha", "Beta"]);
}
