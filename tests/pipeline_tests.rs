use std::collections::BTreeSet;
use std::sync::Arc;

use subcompiler::generator::dedup::deduplicate;
use subcompiler::generator::filter::filter_nodes;
use subcompiler::generator::remark::{render, RenameContext};
use subcompiler::models::{FilterConfig, SelectionItem, TestStatus};
use subcompiler::store::{FileTemplateStore, MemoryNodeStore};
use subcompiler::utils::base64::base64_decode;
use subcompiler::utils::http::{CancelFlag, FetchError, FetchResponse, Fetcher};
use subcompiler::{
    CompileTarget, Diagnostics, Node, PreviewRequest, PreviewService, Settings, Subscription,
    SubscriptionCompiler,
};

struct OfflineFetcher;

impl Fetcher for OfflineFetcher {
    fn fetch(&self, url: &str, _cancel: &CancelFlag) -> Result<FetchResponse, FetchError> {
        Err(FetchError::Network(format!("offline: {}", url)))
    }
}

fn node(id: u64, name: &str, host: &str) -> Node {
    Node {
        id,
        name: name.to_string(),
        link: format!("trojan://pw@{}:443", host),
        host: host.to_string(),
        port: 443,
        protocol: "trojan".to_string(),
        group: "imported".to_string(),
        ..Default::default()
    }
}

fn with_delay(mut node: Node, delay: u32, status: TestStatus) -> Node {
    node.delay_time = delay;
    node.delay_status = status;
    node
}

fn compiler(store: Arc<MemoryNodeStore>) -> SubscriptionCompiler {
    let fetcher: Arc<dyn Fetcher> = Arc::new(OfflineFetcher);
    SubscriptionCompiler::new(
        store,
        Arc::new(FileTemplateStore::new(Arc::clone(&fetcher))),
        fetcher,
        Arc::new(Settings::new()),
    )
}

#[test]
fn test_delay_threshold_keeps_only_fast_tested_nodes() {
    let nodes = vec![
        with_delay(node(1, "N1", "a.example.com"), 50, TestStatus::Success),
        with_delay(node(2, "N2", "b.example.com"), 0, TestStatus::Untested),
        with_delay(node(3, "N3", "c.example.com"), 300, TestStatus::Success),
    ];
    let cfg = FilterConfig {
        max_delay: 100,
        ..Default::default()
    };
    let mut diag = Diagnostics::default();
    let kept = filter_nodes(nodes, &cfg, &mut diag);
    let ids: Vec<u64> = kept.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![1]);
}

#[test]
fn test_tightening_a_threshold_never_grows_the_result() {
    let nodes: Vec<Node> = (1..=20)
        .map(|i| with_delay(node(i, &format!("n{}", i), "h.example.com"), i as u32 * 25, TestStatus::Success))
        .collect();
    let mut previous = usize::MAX;
    for max_delay in [1000, 400, 250, 100, 25] {
        let cfg = FilterConfig {
            max_delay,
            ..Default::default()
        };
        let mut diag = Diagnostics::default();
        let kept = filter_nodes(nodes.clone(), &cfg, &mut diag);
        assert!(kept.len() <= previous);
        assert!(kept.iter().all(|k| nodes.contains(k)));
        previous = kept.len();
    }
    assert_eq!(previous, 1);
}

#[test]
fn test_dedup_keeps_first_listed_and_order() {
    let mut second = node(2, "dup", "a.com");
    second.protocol = "vmess".to_string();
    let mut first = node(1, "first", "a.com");
    first.protocol = "vmess".to_string();
    let nodes = vec![
        node(5, "other", "b.com"),
        first,
        second,
        node(7, "last", "c.com"),
    ];
    let mut diag = Diagnostics::default();
    let kept = deduplicate(
        nodes,
        r#"{"fields": ["host", "port", "protocol"]}"#,
        &mut diag,
    );
    let ids: Vec<u64> = kept.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![5, 1, 7]);
    assert!(diag.warnings.is_empty());
}

#[test]
fn test_malformed_dedup_rule_is_a_no_op() {
    let nodes = vec![node(1, "a", "a.com"), node(2, "b", "a.com")];
    let mut diag = Diagnostics::default();
    let kept = deduplicate(nodes, "{not json", &mut diag);
    assert_eq!(kept.len(), 2);
    assert_eq!(diag.warnings.len(), 1);
}

#[test]
fn test_render_differs_only_in_index() {
    let base = RenameContext {
        name: "foo".to_string(),
        country: "HK".to_string(),
        index: 1,
        ..Default::default()
    };
    let other = RenameContext {
        index: 2,
        ..base.clone()
    };
    assert_eq!(render("{{index}}-{{country}}-{{name}}", &base), "1-HK-foo");
    assert_eq!(render("{{index}}-{{country}}-{{name}}", &other), "2-HK-foo");
    assert_eq!(
        render("{{country}}-{{name}}", &base),
        render("{{country}}-{{name}}", &other)
    );
    assert_eq!(render("{{unknown}} {{name}}", &base), "{{unknown}} foo");
}

#[test]
fn test_preview_matches_persisted_rendering() {
    let mut tagged = node(3, "Osaka", "c.example.com");
    tagged.tags = BTreeSet::from(["premium".to_string()]);
    tagged.dialer_proxy_name = Some("Home".to_string());
    let store = Arc::new(MemoryNodeStore::with_nodes(vec![
        node(1, "Tokyo", "a.example.com"),
        node(2, "Tokyo", "b.example.com"),
        tagged,
        node(4, "Seoul", "a.example.com"),
    ]));
    let sub = Subscription {
        id: 1,
        name: "daily".to_string(),
        selection: vec![
            SelectionItem::Group {
                group: "imported".to_string(),
                sort: 1,
            },
            SelectionItem::Node { node_id: 3, sort: 0 },
        ],
        node_name_rule: "{{index:2}} {{name}}".to_string(),
        node_name_preprocess: r#"[{"match": "^Tok", "replace": "TOK"}]"#.to_string(),
        deduplication_rule: r#"{"fields": ["host"]}"#.to_string(),
        ..Default::default()
    };

    let compiled = compiler(Arc::clone(&store))
        .compile(&sub, &[], CompileTarget::List, &CancelFlag::new())
        .unwrap();
    let preview = PreviewService::new(store)
        .preview(&PreviewRequest::from(&sub))
        .unwrap();

    assert_eq!(compiled.nodes, preview.nodes);
    assert_eq!(preview.names(), vec!["01 Osaka", "02 TOKyo", "03 TOKyo"]);
    assert_eq!(preview.entries()[0].dialer_proxy.as_deref(), Some("Home"));
}

#[test]
fn test_repeated_names_are_suffixed() {
    let store = Arc::new(MemoryNodeStore::with_nodes(vec![
        node(1, "Same", "a.example.com"),
        node(2, "Same", "b.example.com"),
        node(3, "Same", "c.example.com"),
    ]));
    let request = subcompiler::PreviewRequestBuilder::new()
        .add_group("imported")
        .build()
        .unwrap();
    let preview = PreviewService::new(store).preview(&request).unwrap();
    assert_eq!(preview.names(), vec!["Same", "Same 2", "Same 3"]);
}

#[test]
fn test_undecodable_link_is_skipped_with_one_warning() {
    let mut broken = node(2, "Broken", "bad.example.com");
    broken.link = "trojan://pw@bad.example.com#no-port".to_string();
    let store = Arc::new(MemoryNodeStore::with_nodes(vec![
        node(1, "A", "a.example.com"),
        broken,
        node(3, "C", "c.example.com"),
    ]));
    let sub = Subscription {
        selection: vec![SelectionItem::Group {
            group: "imported".to_string(),
            sort: 0,
        }],
        ..Default::default()
    };

    let result = compiler(store)
        .compile(&sub, &[], CompileTarget::Clash, &CancelFlag::new())
        .unwrap();
    let doc: serde_yaml::Value = serde_yaml::from_str(&result.content).unwrap();
    let names: Vec<&str> = doc["proxies"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert_eq!(names, vec!["A", "C"]);
    assert_eq!(result.diagnostics.warnings.len(), 1);
    assert!(result.diagnostics.warnings[0].contains("Broken"));
}

#[test]
fn test_list_output_is_base64_by_default() {
    let store = Arc::new(MemoryNodeStore::with_nodes(vec![
        node(1, "A", "a.example.com"),
        node(2, "B", "b.example.com"),
    ]));
    let mut sub = Subscription {
        selection: vec![SelectionItem::Group {
            group: "imported".to_string(),
            sort: 0,
        }],
        node_name_rule: "{{index}}-{{name}}".to_string(),
        ..Default::default()
    };
    let compiler = compiler(store);

    let encoded = compiler
        .compile(&sub, &[], CompileTarget::List, &CancelFlag::new())
        .unwrap();
    let decoded = base64_decode(&encoded.content);
    let lines: Vec<&str> = decoded.lines().collect();
    assert_eq!(
        lines,
        vec![
            "trojan://pw@a.example.com:443#1-A",
            "trojan://pw@b.example.com:443#2-B"
        ]
    );

    sub.config.list_base64 = Some(false);
    let plain = compiler
        .compile(&sub, &[], CompileTarget::List, &CancelFlag::new())
        .unwrap();
    assert_eq!(plain.content, decoded);
}
