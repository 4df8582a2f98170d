//! Style construction from configuration documents.

use std::collections::BTreeMap;
use std::sync::Arc;

use raster_common::{BandResolver, IdentityResolver, StyleError, StyleResult};
use tracing::{info, warn};

use crate::band_math::FunctionRegistry;
use crate::config::{StyleConfig, StyleDocument};
use crate::style::{BuildContext, HybridStyle, LinearStyle, RampStyle, Style, ValueMapStyle};

/// Builds styles for one layer.
///
/// The strategy is chosen by the first indicator present in the document:
/// `component_ratio` (hybrid), `components` (linear), `value_map`, then a
/// ramp block (`color_ramp`, `palette` or `range`).
#[derive(Clone)]
pub struct StyleFactory {
    resolver: Arc<dyn BandResolver>,
    registry: FunctionRegistry,
    always_fetch: Vec<String>,
}

/// Outcome of building every style in a config.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub styles: BTreeMap<String, Style>,
    pub failures: Vec<(String, StyleError)>,
}

impl BuildReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Default for StyleFactory {
    fn default() -> Self {
        Self::new(Arc::new(IdentityResolver))
    }
}

impl std::fmt::Debug for StyleFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StyleFactory")
            .field("registry", &self.registry)
            .field("always_fetch", &self.always_fetch)
            .finish_non_exhaustive()
    }
}

impl StyleFactory {
    pub fn new(resolver: Arc<dyn BandResolver>) -> Self {
        Self {
            resolver,
            registry: FunctionRegistry::with_builtins(),
            always_fetch: Vec::new(),
        }
    }

    pub fn with_registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Bands fetched for every style of the layer.
    pub fn with_always_fetch<I, S>(mut self, bands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.always_fetch = bands.into_iter().map(Into::into).collect();
        self
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn build(&self, name: &str, doc: &StyleDocument) -> StyleResult<Style> {
        let ctx = BuildContext {
            resolver: self.resolver.as_ref(),
            registry: &self.registry,
            always_fetch: &self.always_fetch,
        };

        let style = if doc.component_ratio.is_some() {
            Style::Hybrid(HybridStyle::from_document(name, doc, &ctx)?)
        } else if doc.components.is_some() {
            Style::Linear(LinearStyle::from_document(name, doc, &ctx)?)
        } else if doc.value_map.is_some() {
            Style::ValueMap(ValueMapStyle::from_document(name, doc, &ctx)?)
        } else if doc.has_ramp_block() {
            Style::Ramp(RampStyle::from_document(name, doc, &ctx)?)
        } else {
            return Err(StyleError::NoMatchingStrategy(name.to_string()));
        };

        info!(
            style = name,
            kind = %style.kind(),
            bands = style.needed_bands().len(),
            "Built style"
        );
        Ok(style)
    }

    /// Build every style in `config`. A failing style is recorded and the
    /// rest are still built.
    pub fn build_all(&self, config: &StyleConfig) -> BuildReport {
        let mut report = BuildReport::default();
        for (name, doc) in &config.styles {
            match self.build(name, doc) {
                Ok(style) => {
                    report.styles.insert(name.clone(), style);
                }
                Err(e) => {
                    warn!(style = %name, error = %e, "Failed to build style");
                    report.failures.push((name.clone(), e));
                }
            }
        }
        report
    }
}
