//! The validated configuration an engine call works from.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, Span};

use super::cache::{ResourceDiff, StateCache};
use super::resolver::IgnoreDiffConfig;
use crate::error::{Error, Result};
use crate::normalizers::KnownTypeRegistry;
use crate::settings::{
    DiffSettings, IgnoreNormalizerOpts, ResourceIgnoreDifferences, ResourceOverride, TrackingMethod,
    DEFAULT_APP_INSTANCE_LABEL_KEY,
};
use crate::typed::SchemaRegistry;

/// The field manager structured merge diffs apply as unless configured.
pub const DEFAULT_MANAGER: &str = "argocd-controller";

/// Everything `state_diffs`, `normalize` and `pre_diff_normalize` need.
/// Built through [`DiffConfigBuilder`].
pub struct DiffConfig {
    ignores: Option<Vec<ResourceIgnoreDifferences>>,
    overrides: Option<HashMap<String, ResourceOverride>>,
    app_label_key: String,
    tracking_method: TrackingMethod,
    app_name: String,
    no_cache: bool,
    state_cache: Option<Arc<dyn StateCache>>,
    ignore_aggregated_roles: bool,
    ignore_normalizer_opts: IgnoreNormalizerOpts,
    log_span: Option<Span>,
    structured_merge_diff: bool,
    manager: String,
    schema_registry: SchemaRegistry,
    known_types: KnownTypeRegistry,
}

impl Default for DiffConfig {
    fn default() -> Self {
        DiffConfig {
            ignores: None,
            overrides: None,
            app_label_key: DEFAULT_APP_INSTANCE_LABEL_KEY.to_string(),
            tracking_method: TrackingMethod::Label,
            app_name: String::new(),
            no_cache: false,
            state_cache: None,
            ignore_aggregated_roles: false,
            ignore_normalizer_opts: IgnoreNormalizerOpts::default(),
            log_span: None,
            structured_merge_diff: false,
            manager: DEFAULT_MANAGER.to_string(),
            schema_registry: SchemaRegistry::new(),
            known_types: KnownTypeRegistry::new(),
        }
    }
}

impl fmt::Debug for DiffConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffConfig")
            .field("ignores", &self.ignores)
            .field("overrides", &self.overrides)
            .field("app_label_key", &self.app_label_key)
            .field("tracking_method", &self.tracking_method)
            .field("app_name", &self.app_name)
            .field("no_cache", &self.no_cache)
            .field("state_cache", &self.state_cache.is_some())
            .field("ignore_aggregated_roles", &self.ignore_aggregated_roles)
            .field("ignore_normalizer_opts", &self.ignore_normalizer_opts)
            .field("structured_merge_diff", &self.structured_merge_diff)
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl DiffConfig {
    pub fn ignores(&self) -> &[ResourceIgnoreDifferences] {
        self.ignores.as_deref().unwrap_or_default()
    }

    pub fn overrides(&self) -> &HashMap<String, ResourceOverride> {
        static EMPTY: Lazy<HashMap<String, ResourceOverride>> = Lazy::new(HashMap::new);
        self.overrides.as_ref().unwrap_or(&EMPTY)
    }

    pub fn app_label_key(&self) -> &str {
        &self.app_label_key
    }

    pub fn tracking_method(&self) -> TrackingMethod {
        self.tracking_method
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn no_cache(&self) -> bool {
        self.no_cache
    }

    pub fn state_cache(&self) -> Option<&Arc<dyn StateCache>> {
        self.state_cache.as_ref()
    }

    pub fn ignore_aggregated_roles(&self) -> bool {
        self.ignore_aggregated_roles
    }

    pub fn ignore_normalizer_opts(&self) -> &IgnoreNormalizerOpts {
        &self.ignore_normalizer_opts
    }

    pub fn log_span(&self) -> Option<&Span> {
        self.log_span.as_ref()
    }

    pub fn structured_merge_diff(&self) -> bool {
        self.structured_merge_diff
    }

    pub fn manager(&self) -> &str {
        &self.manager
    }

    pub fn schema_registry(&self) -> &SchemaRegistry {
        &self.schema_registry
    }

    pub fn known_types(&self) -> &KnownTypeRegistry {
        &self.known_types
    }

    pub(crate) fn ignore_diff_config(&self) -> IgnoreDiffConfig<'_> {
        IgnoreDiffConfig::new(self.ignores(), self.overrides())
    }

    /// Checks the configuration is complete.
    pub fn validate(&self) -> Result<()> {
        if self.ignores.is_none() {
            return Err(Error::Config("ResourceIgnoreDifferences can not be nil".into()));
        }
        if self.overrides.is_none() {
            return Err(Error::Config("ResourceOverride can not be nil".into()));
        }
        if !self.no_cache {
            if self.app_name.is_empty() {
                return Err(Error::Config("AppName must be set when retrieving from cache".into()));
            }
            if self.state_cache.is_none() {
                return Err(Error::Config("StateCache must be set when retrieving from cache".into()));
            }
        }
        Ok(())
    }

    /// Loads the cached diffs of `app_name`.
    ///
    /// Returns `None` when caching is disabled or nothing can be loaded.
    pub fn diff_from_cache(&self, app_name: &str) -> Option<Vec<ResourceDiff>> {
        if self.no_cache || app_name.is_empty() {
            return None;
        }
        let cache = self.state_cache.as_ref()?;
        match cache.get_app_managed_resources(app_name) {
            Ok(diffs) => Some(diffs),
            Err(e) => {
                error!(app = app_name, error = %e, "DiffFromCache error: error getting managed resources");
                None
            }
        }
    }
}

/// Builder for [`DiffConfig`].
///
/// ```
/// use gitops_diff::diff::DiffConfigBuilder;
///
/// let config = DiffConfigBuilder::new()
///     .with_diff_settings(Vec::new(), Default::default(), false, Default::default())
///     .with_no_cache()
///     .build()
///     .unwrap();
/// assert!(config.no_cache());
/// ```
#[derive(Debug, Default)]
pub struct DiffConfigBuilder {
    config: DiffConfig,
}

impl DiffConfigBuilder {
    pub fn new() -> Self {
        DiffConfigBuilder::default()
    }

    pub fn with_diff_settings(
        mut self,
        ignores: Vec<ResourceIgnoreDifferences>,
        overrides: HashMap<String, ResourceOverride>,
        ignore_aggregated_roles: bool,
        ignore_normalizer_opts: IgnoreNormalizerOpts,
    ) -> Self {
        self.config.ignores = Some(ignores);
        self.config.overrides = Some(overrides);
        self.config.ignore_aggregated_roles = ignore_aggregated_roles;
        self.config.ignore_normalizer_opts = ignore_normalizer_opts;
        self
    }

    /// Applies diff and tracking settings loaded from configuration.
    pub fn with_settings(self, settings: DiffSettings) -> Self {
        let DiffSettings {
            ignores,
            overrides,
            ignore_aggregated_roles,
            app_instance_label_key,
            tracking_method,
            ignore_normalizer_opts,
        } = settings;
        self.with_diff_settings(ignores, overrides, ignore_aggregated_roles, ignore_normalizer_opts)
            .with_tracking(app_instance_label_key, tracking_method)
    }

    pub fn with_tracking(mut self, label_key: impl Into<String>, tracking_method: TrackingMethod) -> Self {
        self.config.app_label_key = label_key.into();
        self.config.tracking_method = tracking_method;
        self
    }

    pub fn with_no_cache(mut self) -> Self {
        self.config.no_cache = true;
        self
    }

    pub fn with_cache(mut self, state_cache: Arc<dyn StateCache>, app_name: impl Into<String>) -> Self {
        self.config.no_cache = false;
        self.config.state_cache = Some(state_cache);
        self.config.app_name = app_name.into();
        self
    }

    pub fn with_log_span(mut self, span: Span) -> Self {
        self.config.log_span = Some(span);
        self
    }

    /// Diffs every resource by predicting a server-side apply. Resources
    /// whose sync options enable server-side apply are diffed this way
    /// regardless.
    pub fn with_structured_merge_diff(mut self, enabled: bool) -> Self {
        self.config.structured_merge_diff = enabled;
        self
    }

    /// Sets the field manager structured merge diffs apply as.
    pub fn with_manager(mut self, manager: impl Into<String>) -> Self {
        self.config.manager = manager.into();
        self
    }

    pub fn with_schema_registry(mut self, registry: SchemaRegistry) -> Self {
        self.config.schema_registry = registry;
        self
    }

    pub fn with_known_type_registry(mut self, registry: KnownTypeRegistry) -> Self {
        self.config.known_types = registry;
        self
    }

    pub fn build(self) -> Result<DiffConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
