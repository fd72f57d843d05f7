//! One adapter per supported package manager

pub mod bun;
pub mod npm;
pub mod pnpm;
pub mod yarn;

use crate::adapter::PackageManagerAdapter;
use crate::detect::ManagerKind;

/// Get the adapter for a package manager.
pub fn get_adapter(kind: ManagerKind) -> Box<dyn PackageManagerAdapter> {
    match kind {
        ManagerKind::Pnpm => Box::new(pnpm::PnpmAdapter),
        ManagerKind::Npm => Box::new(npm::NpmAdapter),
        ManagerKind::Yarn => Box::new(yarn::YarnAdapter),
        ManagerKind::Bun => Box::new(bun::BunAdapter),
    }
}
