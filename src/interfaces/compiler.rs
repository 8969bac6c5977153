use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info};

use crate::codec::{Codec, LinkCodec};
use crate::error::CompileError;
use crate::generator::subinfo::accumulate;
use crate::generator::{
    aggregate_usage, assemble, deduplicate, fetch_embedded, filter_nodes, format_userinfo,
    render_nodes, resolve_chains, retain_emittable, AssembleContext, CompileTarget, RenderedNode,
    SUBSCRIPTION_USERINFO,
};
use crate::models::{ChainRule, Diagnostics, Node, SelectionItem, Subscription};
use crate::settings::Settings;
use crate::store::{
    FileTemplateStore, MemoryUsageStore, NodeStore, StoreError, SubscriptionStore, TemplateStore,
    UsageStore,
};
use crate::utils::http::{CancelFlag, FetchError, Fetcher, HttpFetcher};

/// Result of one compilation
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// The rendered document
    pub content: String,
    /// Response headers, e.g. `subscription-userinfo`
    pub headers: HashMap<String, String>,
    /// Rendered nodes in output order, before per-target entry checks, so
    /// they equal a preview of the same subscription
    pub nodes: Vec<RenderedNode>,
    pub diagnostics: Diagnostics,
}

fn expand_selection(
    store: &dyn NodeStore,
    subscription: &Subscription,
) -> Result<Vec<Node>, StoreError> {
    let mut seen: HashSet<u64> = HashSet::new();
    let mut nodes: Vec<Node> = Vec::new();
    for item in subscription.ordered_selection() {
        let batch = match item {
            SelectionItem::Node { node_id, .. } => store.list_by_ids(&[*node_id])?,
            SelectionItem::Group { group, .. } => store.list_by_group(group)?,
        };
        nodes.extend(batch.into_iter().filter(|n| seen.insert(n.id)));
    }
    Ok(nodes)
}

/// Select, filter, deduplicate and rename the nodes of a subscription.
///
/// Shared by the persisted compile path and the preview service so both
/// produce the same node list for the same input.
pub fn prepare_nodes(
    store: &dyn NodeStore,
    subscription: &Subscription,
    diag: &mut Diagnostics,
) -> Result<Vec<RenderedNode>, CompileError> {
    let selected = expand_selection(store, subscription)?;
    let selected_count = selected.len();

    let filtered = filter_nodes(selected, &subscription.filter, diag);
    let filtered_count = filtered.len();

    let unique = deduplicate(filtered, &subscription.deduplication_rule, diag);
    debug!(
        "Subscription '{}': {} selected, {} after filter, {} after dedup",
        subscription.name,
        selected_count,
        filtered_count,
        unique.len()
    );

    Ok(render_nodes(
        unique,
        &subscription.node_name_rule,
        &subscription.node_name_preprocess,
        diag,
    ))
}

/// Compiles persisted subscriptions into client documents
pub struct SubscriptionCompiler {
    nodes: Arc<dyn NodeStore>,
    templates: Arc<dyn TemplateStore>,
    fetcher: Arc<dyn Fetcher>,
    usage: Arc<dyn UsageStore>,
    codec: Arc<dyn Codec>,
    settings: Arc<Settings>,
}

impl SubscriptionCompiler {
    pub fn new(
        nodes: Arc<dyn NodeStore>,
        templates: Arc<dyn TemplateStore>,
        fetcher: Arc<dyn Fetcher>,
        settings: Arc<Settings>,
    ) -> Self {
        SubscriptionCompiler {
            nodes,
            templates,
            fetcher,
            usage: Arc::new(MemoryUsageStore::new()),
            codec: Arc::new(LinkCodec),
            settings,
        }
    }

    /// Build a compiler with an HTTP fetcher and file templates configured
    /// from `settings`
    pub fn from_settings(
        nodes: Arc<dyn NodeStore>,
        settings: Arc<Settings>,
    ) -> Result<Self, FetchError> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&settings.fetch_options())?);
        let templates = Arc::new(FileTemplateStore::new(Arc::clone(&fetcher)));
        Ok(Self::new(nodes, templates, fetcher, settings))
    }

    pub fn with_usage_store(mut self, usage: Arc<dyn UsageStore>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    fn load_base(&self, subscription: &Subscription, target: CompileTarget) -> Result<String, CompileError> {
        if target == CompileTarget::List {
            return Ok(String::new());
        }
        let reference = match subscription.config.template.trim() {
            "" => self.settings.default_template(target).trim(),
            explicit => explicit,
        };
        if reference.is_empty() {
            return Ok(String::new());
        }
        self.templates
            .load(reference)
            .map_err(|source| CompileError::BaseTemplate {
                reference: reference.to_string(),
                source,
            })
    }

    /// Compile a subscription with its chain rules
    ///
    /// # Arguments
    /// * `subscription` - The subscription to render
    /// * `rules` - Its chain rules; disabled ones are ignored
    /// * `target` - Output format
    /// * `cancel` - Checked between stages and during embedded fetches
    ///
    /// # Returns
    /// The document, response headers and diagnostics. Only an unusable base
    /// template, a serialization failure or cancellation is an error.
    pub fn compile(
        &self,
        subscription: &Subscription,
        rules: &[ChainRule],
        target: CompileTarget,
        cancel: &CancelFlag,
    ) -> Result<CompileResult, CompileError> {
        info!(
            "Compiling subscription '{}' to {}",
            subscription.name, target
        );
        if cancel.is_cancelled() {
            return Err(CompileError::Cancelled);
        }

        let mut diag = Diagnostics::default();
        let base = self.load_base(subscription, target)?;
        let nodes = prepare_nodes(&*self.nodes, subscription, &mut diag)?;
        let emittable = retain_emittable(target, nodes.clone(), &*self.codec, &mut diag);

        let chains = resolve_chains(rules, &emittable, &mut diag);
        diag.coverage = chains.coverage.clone();

        let embedded = fetch_embedded(&emittable, &*self.fetcher, cancel, &mut diag)
            .map_err(|_| CompileError::Cancelled)?;
        if cancel.is_cancelled() {
            return Err(CompileError::Cancelled);
        }

        let ctx = AssembleContext {
            nodes: &emittable,
            chains: &chains,
            embedded: &embedded,
            base: &base,
            output: &subscription.config,
            list_base64: subscription
                .config
                .list_base64
                .unwrap_or(self.settings.output.list_base64),
            codec: &*self.codec,
        };
        let content = assemble(target, &ctx, &mut diag)?;

        let mut headers: HashMap<String, String> = HashMap::new();
        let mut usage = aggregate_usage(&emittable, &*self.usage, &mut diag);
        for fetched in embedded.values().filter_map(|e| e.usage.as_ref()) {
            accumulate(usage.get_or_insert_with(Default::default), fetched);
        }
        if let Some(usage) = usage {
            headers.insert(SUBSCRIPTION_USERINFO.to_string(), format_userinfo(&usage));
        }

        info!(
            "Compiled subscription '{}': {} node(s), {} warning(s)",
            subscription.name,
            emittable.len(),
            diag.warnings.len()
        );
        Ok(CompileResult {
            content,
            headers,
            nodes,
            diagnostics: diag,
        })
    }

    /// Look up a persisted subscription by name and compile it
    pub fn compile_by_name(
        &self,
        store: &dyn SubscriptionStore,
        name: &str,
        target: CompileTarget,
        cancel: &CancelFlag,
    ) -> Result<CompileResult, CompileError> {
        let subscription = store.find_by_name(name).map_err(|e| match e {
            StoreError::NotFound(_) => CompileError::SubscriptionNotFound(name.to_string()),
            other => CompileError::Store(other),
        })?;
        let rules = store.chain_rules(subscription.id)?;
        self.compile(&subscription, &rules, target, cancel)
    }
}
