use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use site_search_index::config::{parse_config, Config};
use site_search_index::index::IndexArtifact;
use site_search_index::ingest::{IngestOutcome, Ingestor, NodeFilter};
use site_search_index::models::SourceNode;
use site_search_index::pipeline::Pipeline;
use site_search_index::registry::SEARCH_INDEX_ID;
use site_search_index::resolver::{FieldResolvers, ResolverSet};
use site_search_index::store::memory::InMemoryGraph;
use site_search_index::store::{ContentGraph, NodeLookup};

fn title_of(node: &SourceNode, _: &dyn NodeLookup) -> Value {
    node.field("title").cloned().unwrap_or(Value::Null)
}

fn config(namespaced: bool) -> Config {
    let mut config = parse_config("[fuse_options]\nkeys = [\"title\"]\n").unwrap();
    config.index.use_resolver_namespaces = namespaced;
    config
}

fn post(id: &str, title: &str) -> SourceNode {
    SourceNode::new(id, "BlogPost").with_field("title", title)
}

#[tokio::test]
async fn test_single_post_scenario() {
    let resolvers = ResolverSet::new().with_fields("BlogPost", FieldResolvers::new().field("title", title_of));
    let pipeline = Pipeline::with_resolvers(&config(false), resolvers).unwrap();

    pipeline
        .ingest(vec![post("p1", "Hello").with_date("2020-01-01")])
        .await
        .unwrap();

    let (registry, artifact) = pipeline.build().await.unwrap();
    assert_eq!(registry.unwrap().pages, vec!["p1"]);
    let Some(IndexArtifact::Single(bucket)) = artifact else {
        panic!("expected a single bucket");
    };
    assert_eq!(
        serde_json::to_value(&bucket.documents).unwrap(),
        json!([{ "id": "p1", "date": "2020-01-01", "title": "Hello" }])
    );
    assert_eq!(bucket.index["records"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_namespaced_scenario() {
    let resolvers = ResolverSet::new()
        .with_namespace("BlogPost", "meta", FieldResolvers::new().field("title", title_of))
        .with_namespace(
            "BlogPost",
            "body",
            FieldResolvers::new().field("content", |node: &SourceNode, _: &dyn NodeLookup| {
                node.field("body").cloned().unwrap_or(Value::Null)
            }),
        );
    let pipeline = Pipeline::with_resolvers(&config(true), resolvers).unwrap();
    pipeline
        .ingest(vec![post("p1", "Hello").with_field("body", "Some text")])
        .await
        .unwrap();

    let (_, artifact) = pipeline.build().await.unwrap();
    let artifact = artifact.unwrap();
    let meta = artifact.bucket("meta").unwrap();
    let body = artifact.bucket("body").unwrap();

    assert_eq!(serde_json::to_value(&meta.documents).unwrap(), json!([{ "id": "p1", "title": "Hello" }]));
    assert_eq!(
        serde_json::to_value(&body.documents).unwrap(),
        json!([{ "id": "p1", "content": "Some text" }])
    );
}

#[tokio::test]
async fn test_documents_follow_ingestion_order() {
    let resolvers = ResolverSet::new().with_fields("BlogPost", FieldResolvers::new().field("title", title_of));
    let pipeline = Pipeline::with_resolvers(&config(false), resolvers).unwrap();
    pipeline
        .ingest(vec![post("C", "c"), post("A", "a"), post("B", "b")])
        .await
        .unwrap();

    let (_, artifact) = pipeline.build().await.unwrap();
    let artifact = artifact.unwrap();
    let ids: Vec<&str> = artifact
        .bucket(site_search_index::resolver::DEFAULT_NAMESPACE)
        .unwrap()
        .documents
        .iter()
        .filter_map(|d| d.id())
        .collect();
    assert_eq!(ids, vec!["C", "A", "B"]);
}

#[tokio::test]
async fn test_warm_cache_skips_resolvers_until_registry_changes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let resolvers = ResolverSet::new().with_fields(
        "BlogPost",
        FieldResolvers::new().field("title", move |node: &SourceNode, lookup: &dyn NodeLookup| {
            counter.fetch_add(1, Ordering::SeqCst);
            title_of(node, lookup)
        }),
    );
    let pipeline = Pipeline::with_resolvers(&config(false), resolvers).unwrap();
    pipeline.ingest(vec![post("p1", "Hello")]).await.unwrap();

    let (_, first) = pipeline.build().await.unwrap();
    let (_, second) = pipeline.build().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    pipeline.ingest(vec![post("p2", "World")]).await.unwrap();
    let (_, third) = pipeline.build().await.unwrap();
    assert_eq!(third.unwrap().document_count(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_ineligible_nodes_never_reach_the_registry() {
    let graph = Arc::new(InMemoryGraph::new());
    let resolvers = ResolverSet::new().with_fields("BlogPost", FieldResolvers::new().field("title", title_of));
    let filter: NodeFilter = Arc::new(|node: &SourceNode, _: &dyn NodeLookup| {
        node.field("title") != Some(&json!("hidden"))
    });
    let ingestor = Ingestor::new(graph.clone(), &resolvers, SEARCH_INDEX_ID).with_filter(Some(filter));

    let nodes = vec![
        post("p1", "Hello"),
        SourceNode::new("a1", "Author"),
        post("p2", "hidden"),
    ];
    let mut outcomes = Vec::new();
    for node in &nodes {
        graph.create_node(node.clone()).await.unwrap();
        outcomes.push(ingestor.on_node_created(node).await.unwrap());
    }

    assert_eq!(
        outcomes,
        vec![
            IngestOutcome::Appended { pages: 1 },
            IngestOutcome::UnsupportedType,
            IngestOutcome::Filtered,
        ]
    );
    let registry = graph.get_search_index(SEARCH_INDEX_ID).await.unwrap().unwrap();
    assert_eq!(registry.pages, vec!["p1"]);
}

#[tokio::test]
async fn test_snapshot_matches_query_result() {
    let tmp = TempDir::new().unwrap();
    let mut config = config(false);
    config.index.copy_serialization_to_file = Some("search.json".to_string());
    config.index.output_dir = tmp.path().join("public");

    let resolvers = ResolverSet::new().with_fields("BlogPost", FieldResolvers::new().field("title", title_of));
    let pipeline = Pipeline::with_resolvers(&config, resolvers).unwrap();
    pipeline.ingest(vec![post("p1", "Hello")]).await.unwrap();

    let report = pipeline.build_and_snapshot().await.unwrap();
    let path = report.snapshot.unwrap();
    assert_eq!(path, tmp.path().join("public/search.json"));

    let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let queried = pipeline.query().query_site_search_index().await.unwrap();
    assert_eq!(written, queried);
}
