//! Config bundles: on-disk layout, single-inheritance resolution and
//! generation of flat user bundles.

mod artifacts;
mod config_bundle;
mod meta;
mod store;

pub use artifacts::{
    BundleArtifacts, ExtraDependency, SourceDescriptor, SubstitutionRule, DOMAIN_REGEX_FILE,
    DOMAIN_SUBSTITUTION_FILE, EXTRA_DEPS_FILE, GN_FLAGS_FILE, PATCH_ORDER_FILE, PRUNING_FILE,
    SOURCE_FILE,
};
pub use config_bundle::{list_dependency_order, BundleKind, ConfigBundle, MAX_BASE_CHAIN};
pub use meta::{BundleMeta, BUNDLE_META};
pub use store::{BundleStore, BundleSummary, RawBundle, CONFIG_BUNDLES_DIR, PATCHES_DIR};
