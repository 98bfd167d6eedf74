//! Plugins — lifecycle hooks, version-constraint checks, and the registry.
//!
//! A plugin participates in one build at five fixed points: before the
//! before_script runs, before any window is created, on each window's
//! creation, after each window finishes, and when the engine reattaches to
//! an already-existing session. Plugins are stateless across builds.
//!
//! Turning a workspace's plugin references into constructible objects is the
//! registry's only job; everything beyond the name→factory map is an
//! external concern.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::infrastructure::channel::ControlChannel;
use crate::types::session::{SessionHandle, WindowHandle};
use crate::version::Version;


/// Declared bounds for one plugin dependency.
///
/// Compatible iff the observed version is at or above the minimum, at or
/// below the maximum (both inclusive), and not in the incompatible set.
#[derive(Debug, Clone)]
pub struct VersionConstraint {
    pub observed: Version,
    pub minimum: Option<Version>,
    pub maximum: Option<Version>,
    pub incompatible: Vec<Version>,
}

impl VersionConstraint {
    pub fn observed(version: Version) -> VersionConstraint {
        VersionConstraint {
            observed: version,
            minimum: None,
            maximum: None,
            incompatible: Vec::new(),
        }
    }

    pub fn minimum(mut self, version: Version) -> VersionConstraint {
        self.minimum = Some(version);
        self
    }

    pub fn maximum(mut self, version: Version) -> VersionConstraint {
        self.maximum = Some(version);
        self
    }

    pub fn incompatible(mut self, versions: Vec<Version>) -> VersionConstraint {
        self.incompatible = versions;
        self
    }

    /// The violated bound or set, if any.
    fn violation(&self) -> Option<String> {
        if let Some(minimum) = &self.minimum {
            if self.observed < *minimum {
                return Some(format!("below minimum {}", minimum));
            }
        }
        if let Some(maximum) = &self.maximum {
            if self.observed > *maximum {
                return Some(format!("above maximum {}", maximum));
            }
        }
        if self.incompatible.contains(&self.observed) {
            return Some("in the incompatible set".to_string());
        }
        None
    }
}


/// The extension interface the builder drives.
///
/// Hooks default to no-ops so a plugin implements only the points it cares
/// about. A hook returning an error aborts the build at that point.
pub trait Plugin: std::fmt::Debug {
    fn name(&self) -> &str;

    /// Dependency bounds to validate before the build starts, in declaration
    /// order.
    fn version_constraints(&self) -> Vec<(String, VersionConstraint)> {
        Vec::new()
    }

    /// Runs once the target session exists, before the before_script.
    fn before_script(&self, _session: &SessionHandle, _channel: &mut dyn ControlChannel) -> Result<()> {
        Ok(())
    }

    /// Runs before any window is created.
    fn before_workspace_builder(
        &self,
        _session: &SessionHandle,
        _channel: &mut dyn ControlChannel,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs right after each window is created, before its panes.
    fn on_window_create(&self, _window: &WindowHandle, _channel: &mut dyn ControlChannel) -> Result<()> {
        Ok(())
    }

    /// Runs after a window's panes, commands, and options are in place.
    fn after_window_finished(
        &self,
        _window: &WindowHandle,
        _channel: &mut dyn ControlChannel,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs when the engine attaches to an already-existing session instead
    /// of building.
    fn reattach(&self, _session: &SessionHandle, _channel: &mut dyn ControlChannel) -> Result<()> {
        Ok(())
    }
}


// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Validated plugins in registration order, plus the per-plugin failures.
///
/// The caller decides whether failures mean skip-and-continue or a full
/// abort; validation itself touches nothing external.
pub struct LoadedPlugins {
    pub plugins: Vec<Box<dyn Plugin>>,
    pub failures: Vec<Error>,
}

/// Check every candidate's version constraints.
///
/// A plugin fails on its first violated dependency; the remaining candidates
/// are still checked so the caller can report everything at once.
pub fn validate_plugins(candidates: Vec<Box<dyn Plugin>>) -> LoadedPlugins {
    let mut plugins = Vec::new();
    let mut failures = Vec::new();
    for candidate in candidates {
        match check_constraints(candidate.as_ref()) {
            Ok(()) => plugins.push(candidate),
            Err(err) => {
                tracing::warn!(plugin = candidate.name(), error = %err, "plugin rejected");
                failures.push(err);
            }
        }
    }
    LoadedPlugins { plugins, failures }
}

fn check_constraints(plugin: &dyn Plugin) -> Result<()> {
    for (dependency, constraint) in plugin.version_constraints() {
        if let Some(violation) = constraint.violation() {
            return Err(Error::IncompatiblePlugin {
                plugin: plugin.name().to_string(),
                dependency,
                observed: constraint.observed.to_string(),
                violation,
            });
        }
    }
    Ok(())
}


// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type PluginFactory = Box<dyn Fn() -> Box<dyn Plugin>>;

/// Capability registry: plugin reference → factory.
#[derive(Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> PluginRegistry {
        PluginRegistry::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: PluginFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Construct candidates for the given references, preserving their order.
    pub fn resolve(&self, references: &[String]) -> Result<Vec<Box<dyn Plugin>>> {
        references
            .iter()
            .map(|name| {
                self.factories
                    .get(name)
                    .map(|factory| factory())
                    .ok_or_else(|| Error::UnknownPlugin(name.clone()))
            })
            .collect()
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Stub {
        name: &'static str,
        constraints: Vec<(String, VersionConstraint)>,
    }

    impl Plugin for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn version_constraints(&self) -> Vec<(String, VersionConstraint)> {
            self.constraints.clone()
        }
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn with_constraint(name: &'static str, dep: &str, c: VersionConstraint) -> Box<dyn Plugin> {
        Box::new(Stub {
            name,
            constraints: vec![(dep.to_string(), c)],
        })
    }

    #[test]
    fn below_minimum_fails_naming_dependency() {
        let candidate = with_constraint("p", "tmux", VersionConstraint::observed(v("1.7")).minimum(v("1.8")));
        let loaded = validate_plugins(vec![candidate]);
        assert!(loaded.plugins.is_empty());
        assert_eq!(loaded.failures.len(), 1);
        match &loaded.failures[0] {
            Error::IncompatiblePlugin {
                dependency,
                observed,
                violation,
                ..
            } => {
                assert_eq!(dependency, "tmux");
                assert_eq!(observed, "1.7");
                assert!(violation.contains("1.8"));
            }
            other => panic!("expected IncompatiblePlugin, got {:?}", other),
        }
    }

    #[test]
    fn minimum_boundary_is_inclusive() {
        let candidate = with_constraint("p", "tmux", VersionConstraint::observed(v("1.8")).minimum(v("1.8")));
        let loaded = validate_plugins(vec![candidate]);
        assert_eq!(loaded.plugins.len(), 1);
        assert!(loaded.failures.is_empty());
    }

    #[test]
    fn maximum_boundary_is_inclusive() {
        let ok = with_constraint("p", "tmux", VersionConstraint::observed(v("3.0")).maximum(v("3.0")));
        let bad = with_constraint("q", "tmux", VersionConstraint::observed(v("3.1")).maximum(v("3.0")));
        let loaded = validate_plugins(vec![ok, bad]);
        assert_eq!(loaded.plugins.len(), 1);
        assert_eq!(loaded.failures.len(), 1);
    }

    #[test]
    fn incompatible_set_rejects_exact_version() {
        let candidate = with_constraint(
            "p",
            "libmux",
            VersionConstraint::observed(v("2.1")).incompatible(vec![v("2.1")]),
        );
        let loaded = validate_plugins(vec![candidate]);
        assert_eq!(loaded.failures.len(), 1);
        match &loaded.failures[0] {
            Error::IncompatiblePlugin { violation, .. } => {
                assert!(violation.contains("incompatible set"));
            }
            other => panic!("expected IncompatiblePlugin, got {:?}", other),
        }
    }

    #[test]
    fn first_failing_dependency_wins() {
        let candidate = Box::new(Stub {
            name: "p",
            constraints: vec![
                ("first".to_string(), VersionConstraint::observed(v("1.0")).minimum(v("2.0"))),
                ("second".to_string(), VersionConstraint::observed(v("1.0")).minimum(v("3.0"))),
            ],
        });
        let loaded = validate_plugins(vec![candidate]);
        match &loaded.failures[0] {
            Error::IncompatiblePlugin { dependency, .. } => assert_eq!(dependency, "first"),
            other => panic!("expected IncompatiblePlugin, got {:?}", other),
        }
    }

    #[test]
    fn validated_plugins_keep_registration_order() {
        let a = with_constraint("a", "tmux", VersionConstraint::observed(v("2.0")));
        let b = with_constraint("b", "tmux", VersionConstraint::observed(v("2.0")));
        let loaded = validate_plugins(vec![a, b]);
        let names: Vec<&str> = loaded.plugins.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn registry_resolves_in_reference_order() {
        let mut registry = PluginRegistry::new();
        registry.register("one", Box::new(|| {
            Box::new(Stub { name: "one", constraints: Vec::new() }) as Box<dyn Plugin>
        }));
        registry.register("two", Box::new(|| {
            Box::new(Stub { name: "two", constraints: Vec::new() }) as Box<dyn Plugin>
        }));
        let resolved = registry
            .resolve(&["two".to_string(), "one".to_string()])
            .unwrap();
        let names: Vec<&str> = resolved.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["two", "one"]);
    }

    #[test]
    fn unknown_reference_is_an_error() {
        let registry = PluginRegistry::new();
        let err = registry.resolve(&["ghost".to_string()]).unwrap_err();
        assert_eq!(err, Error::UnknownPlugin("ghost".into()));
    }
}
