//! Module-type classification of a package manifest
//!
//! Classification happens in two steps. [`ModuleSignals::collect`] reduces a
//! manifest to a handful of booleans, then [`DECISION_TABLE`] is scanned top to
//! bottom and the first matching row wins. Reordering rows changes precedence.

use crate::manifest::PackageManifest;
use crate::model::ModuleType;
use serde_json::Value;

/// Scope whose packages only carry type declarations.
pub const TYPES_SCOPE: &str = "@types/";

/// Everything the decision table looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleSignals {
    pub types_scope: bool,
    /// Some ESM entry is known (from `exports`, or from `type`/`main` when
    /// `exports` gives no signal).
    pub esm: bool,
    /// Same, for CommonJS.
    pub cjs: bool,
    pub module_field: bool,
    pub types_field: bool,
    /// An `exports` field is present, whether or not it gave a signal.
    pub has_exports: bool,
}

/// One row of the decision table.
pub struct Rule {
    pub name: &'static str,
    pub when: fn(&ModuleSignals) -> bool,
    pub then: ModuleType,
}

pub const DECISION_TABLE: &[Rule] = &[
    Rule { name: "types-scope", when: |s| s.types_scope, then: ModuleType::Dts },
    Rule { name: "dual", when: |s| s.esm && s.cjs, then: ModuleType::Dual },
    Rule { name: "esm", when: |s| s.esm, then: ModuleType::Esm },
    Rule { name: "faux-module-field", when: |s| s.module_field, then: ModuleType::Faux },
    Rule { name: "cjs", when: |s| s.cjs, then: ModuleType::Cjs },
    Rule { name: "types-only", when: |s| s.types_field && !s.has_exports, then: ModuleType::Dts },
];

/// Node's behavior for a package with no entry point signals at all.
const FALLBACK: ModuleType = ModuleType::Cjs;

/// Classify a manifest. Pure: reads nothing but the manifest.
pub fn classify_module_type(manifest: &PackageManifest) -> ModuleType {
    decide(&ModuleSignals::collect(manifest))
}

pub fn decide(signals: &ModuleSignals) -> ModuleType {
    DECISION_TABLE
        .iter()
        .find(|rule| (rule.when)(signals))
        .map_or(FALLBACK, |rule| rule.then)
}

/// Name of the rule that classified these signals, for diagnostics.
pub fn deciding_rule(signals: &ModuleSignals) -> &'static str {
    DECISION_TABLE
        .iter()
        .find(|rule| (rule.when)(signals))
        .map_or("fallback", |rule| rule.name)
}

impl ModuleSignals {
    pub fn collect(manifest: &PackageManifest) -> Self {
        let mut exports = ExportSignals::default();
        if let Some(value) = &manifest.exports {
            exports.scan(value);
        }

        let type_module = manifest.module_type.as_deref() == Some("module");
        let (mut esm, mut cjs) = (exports.esm, exports.cjs);
        if !esm && !cjs {
            match manifest.main.as_deref() {
                Some(main) if main.ends_with(".mjs") => esm = true,
                Some(main) if main.ends_with(".cjs") => cjs = true,
                Some(_) if type_module => esm = true,
                Some(_) => cjs = true,
                None if type_module => esm = true,
                None => {}
            }
        }

        ModuleSignals {
            types_scope: manifest
                .name
                .as_deref()
                .is_some_and(|n| n.starts_with(TYPES_SCOPE)),
            esm,
            cjs,
            module_field: manifest.module.is_some(),
            types_field: manifest.types_entry().is_some(),
            has_exports: manifest.exports.is_some(),
        }
    }
}

/// ESM/CJS flags gathered from an `exports` map.
#[derive(Debug, Default)]
struct ExportSignals {
    esm: bool,
    cjs: bool,
}

impl ExportSignals {
    fn scan(&mut self, value: &Value) {
        match value {
            Value::String(path) => self.note_extension(path),
            Value::Array(items) => items.iter().for_each(|item| self.scan(item)),
            Value::Object(map) if map.keys().any(|k| k.starts_with('.')) => {
                for (key, target) in map {
                    if key.starts_with('.') {
                        self.scan(target);
                    }
                }
            }
            Value::Object(conditions) => {
                let import = conditions.contains_key("import");
                let require = conditions.contains_key("require");
                self.esm |= import;
                self.cjs |= require;
                for (key, target) in conditions {
                    match key.as_str() {
                        "import" | "require" | "types" | "typings" => {}
                        "default" if import || require => {}
                        _ => self.scan(target),
                    }
                }
            }
            _ => {}
        }
    }

    /// `default`-style targets only tell us anything for the explicit extensions.
    fn note_extension(&mut self, path: &str) {
        if path.ends_with(".mjs") {
            self.esm = true;
        } else if path.ends_with(".cjs") {
            self.cjs = true;
        }
    }
}
