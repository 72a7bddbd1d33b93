use std::path::Path;
use std::sync::Arc;

use evcol_adapters::{adapter_for_source, load_source_registry, SourceKind};
use evcol_core::{Category, RegionClassifier};

fn workspace_root() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

#[test]
fn shipped_registry_builds_every_adapter() {
    let root = workspace_root();
    let registry = load_source_registry(root.join("sources.yaml")).expect("sources.yaml");
    let classifier = Arc::new(RegionClassifier::default());

    let mut categories = Vec::new();
    for source in &registry.sources {
        let adapter = adapter_for_source(source, &root, classifier.clone())
            .unwrap_or_else(|e| panic!("building {}: {e}", source.source_id));
        assert_eq!(adapter.source_id(), source.source_id);
        assert_eq!(adapter.kind(), source.kind);
        categories.push(adapter.category());
    }

    for category in Category::ALL {
        assert!(categories.contains(&category), "no source for {category}");
    }
}

#[test]
fn only_the_festival_portal_enriches_details() {
    let root = workspace_root();
    let registry = load_source_registry(root.join("sources.yaml")).expect("sources.yaml");
    let classifier = Arc::new(RegionClassifier::default());

    let enriching: Vec<_> = registry
        .sources
        .iter()
        .map(|s| adapter_for_source(s, &root, classifier.clone()).expect("adapter"))
        .filter(|a| a.supports_detail())
        .map(|a| a.kind())
        .collect();
    assert_eq!(enriching, vec![SourceKind::FestivalHtml]);
}
