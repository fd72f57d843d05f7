//! Depscope Adapters: package-manager specific dependency listing
//!
//! Each adapter turns one manager's view of a project into raw nodes keyed by
//! `name@version`; [`list_dependencies`] picks the adapter for a directory.

pub mod adapter;
pub mod detect;
pub mod error;
pub mod exec;
pub mod managers;
mod traverse;


pub use adapter::{ListResult, NodeFilter, PackageManagerAdapter, ResolveContext, ResolveOptions};
pub use detect::{Detection, ManagerKind, detect_manager};
pub use error::{ResolveError, Result};
pub use exec::{CommandRunner, SystemRunner};
pub use managers::bun::{parse_bun_lock, resolve_bun_key};
pub use managers::get_adapter;

#[cfg(any(test, feature = "test-util"))]
pub use exec::FixtureRunner;

/// Detect the package manager for `options.cwd` and list every dependency
/// reachable from the project's workspaces.
pub async fn list_dependencies(
    options: &ResolveOptions,
    runner: &dyn CommandRunner,
) -> Result<ListResult> {
    let Detection { kind, root } = detect_manager(&options.cwd)?;
    let adapter = get_adapter(kind);

    let version = adapter.version(&root, runner).await;
    let ctx = ResolveContext {
        root: &root,
        options,
        runner,
    };
    let packages = adapter.resolve(&ctx).await?;

    tracing::info!(
        "Resolved {} packages with {} {}",
        packages.len(),
        kind,
        version.as_deref().unwrap_or("(unknown version)")
    );

    Ok(ListResult {
        root,
        package_manager: kind,
        package_manager_version: version,
        packages,
    })
}
