//! Channel registry (spec §4.1): a compiled, immutable-after-registration
//! map from topic pattern to channel handler factory.

use std::sync::Arc;

use crate::{channel::ChannelHandler, error::RegistryError, socket::Scratch};

/// A registered topic pattern: either an exact topic or a `<prefix>:*`
/// splat matching any topic sharing that byte-prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Exact(String),
    Prefix(String),
}

impl Pattern {
    /// Parses a pattern string, rejecting a `*` anywhere but the terminal
    /// `:*` suffix (spec §4.1).
    pub fn parse(pattern: &str) -> Result<Self, RegistryError> {
        match pattern.strip_suffix(":*") {
            Some(prefix) if !prefix.contains('*') => Ok(Pattern::Prefix(prefix.to_string())),
            Some(_) => Err(RegistryError::splat_not_terminal(pattern)),
            None if pattern.contains('*') => Err(RegistryError::splat_not_terminal(pattern)),
            None => Ok(Pattern::Exact(pattern.to_string())),
        }
    }

    pub fn matches(&self, topic: &str) -> bool {
        match self {
            Pattern::Exact(t) => t == topic,
            Pattern::Prefix(p) => match topic.strip_prefix(p.as_str()) {
                Some(rest) => rest.is_empty() || rest.starts_with(':'),
                None => false,
            },
        }
    }
}

/// Per-route options: `options.assigns` is merged into `socket.assigns` on
/// join (spec §6 registry DSL).
#[derive(Debug, Clone, Default)]
pub struct ChannelOptions {
    pub assigns: Scratch,
}

/// Builds a fresh handler instance for a joined topic, plus the compile-time
/// metadata (`intercepts`, initial `private` map) spec §6 attaches to a
/// channel module.
pub trait ChannelFactory: Send + Sync {
    fn build(&self) -> Box<dyn ChannelHandler>;
    fn module_name(&self) -> &'static str;
    fn initial_private(&self) -> Scratch;
    fn intercepts(&self) -> &'static [&'static str];
}

struct FactoryFn {
    build: fn() -> Box<dyn ChannelHandler>,
    module_name: &'static str,
    initial_private: fn() -> Scratch,
    intercepts: &'static [&'static str],
}

impl ChannelFactory for FactoryFn {
    fn build(&self) -> Box<dyn ChannelHandler> {
        (self.build)()
    }
    fn module_name(&self) -> &'static str {
        self.module_name
    }
    fn initial_private(&self) -> Scratch {
        (self.initial_private)()
    }
    fn intercepts(&self) -> &'static [&'static str] {
        self.intercepts
    }
}

/// Declarative route: `(pattern, factory, options)`. Resolution is by
/// **registration order, first match wins** — see `DESIGN.md` Open
/// Question 1 for why this crate picked that over most-specific-wins.
struct Route {
    pattern: Pattern,
    factory: Arc<dyn ChannelFactory>,
    options: ChannelOptions,
}

/// Immutable-after-construction map from topic pattern to channel handler.
/// Lookup is `O(number of routes)` with a cheap per-route prefix check,
/// which satisfies spec §9's "O(length of topic) or better" for the route
/// counts real handler modules register (tens, not millions).
#[derive(Default)]
pub struct ChannelRegistry {
    routes: Vec<Route>,
}

pub struct Matched<'a> {
    pub factory: &'a Arc<dyn ChannelFactory>,
    pub options: &'a ChannelOptions,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route. Rejects malformed patterns at registration time
    /// (spec §7.7: configuration errors fail the handler module load).
    pub fn register(
        &mut self,
        pattern: &str,
        factory: Arc<dyn ChannelFactory>,
        options: ChannelOptions,
    ) -> Result<(), RegistryError> {
        let pattern = Pattern::parse(pattern)?;
        self.routes.push(Route { pattern, factory, options });
        Ok(())
    }

    /// `lookup(topic) -> (module, options) | none` (spec §4.1).
    pub fn lookup(&self, topic: &str) -> Option<Matched<'_>> {
        self.routes
            .iter()
            .find(|r| r.pattern.matches(topic))
            .map(|r| Matched { factory: &r.factory, options: &r.options })
    }
}

pub fn factory_fn(
    build: fn() -> Box<dyn ChannelHandler>,
    module_name: &'static str,
    initial_private: fn() -> Scratch,
    intercepts: &'static [&'static str],
) -> Arc<dyn ChannelFactory> {
    Arc::new(FactoryFn { build, module_name, initial_private, intercepts })
}

/// Declarative route-table macro, in the spirit of the teacher's
/// `endpoints!`/`define_dispatch!` table DSL (`macros.rs`), generalized
/// from compile-time typed endpoints to runtime string patterns.
///
/// ```ignore
/// channel_routes! {
///     registry: reg,
///     routes: {
///         "room:*" => RoomChannel,
///     },
/// }
/// ```
#[macro_export]
macro_rules! channel_routes {
    (registry: $reg:expr, routes: { $($pattern:literal => $module:ty),* $(,)? }) => {
        $(
            $reg.register(
                $pattern,
                $crate::registry::factory_fn(
                    || ::std::boxed::Box::new(<$module as ::core::default::Default>::default()),
                    ::core::any::type_name::<$module>(),
                    <$module as $crate::channel::ChannelMeta>::initial_private,
                    <$module as $crate::channel::ChannelMeta>::INTERCEPTS,
                ),
                $crate::registry::ChannelOptions::default(),
            ).expect("channel_routes!: invalid topic pattern");
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_matches_only_itself() {
        let p = Pattern::parse("phoenix").unwrap();
        assert!(p.matches("phoenix"));
        assert!(!p.matches("phoenixy"));
    }

    #[test]
    fn splat_pattern_matches_by_prefix() {
        let p = Pattern::parse("room:*").unwrap();
        assert!(p.matches("room:42"));
        assert!(p.matches("room:"));
        assert!(!p.matches("rooms:1"));
    }

    #[test]
    fn splat_not_at_terminal_position_is_rejected() {
        let err = Pattern::parse("a:*:b").unwrap_err();
        assert!(matches!(err, RegistryError::SplatNotTerminal(_)));
    }

    #[test]
    fn registry_resolves_by_registration_order() {
        let mut reg = ChannelRegistry::new();
        reg.register("room:*", factory_fn(|| panic!("unused"), "A", Scratch::new, &[]), ChannelOptions::default())
            .unwrap();
        reg.register(
            "room:lobby",
            factory_fn(|| panic!("unused"), "B", Scratch::new, &[]),
            ChannelOptions::default(),
        )
        .unwrap();
        let m = reg.lookup("room:lobby").unwrap();
        assert_eq!(m.factory.module_name(), "A");
    }

    #[test]
    fn unmatched_topic_returns_none() {
        let reg = ChannelRegistry::new();
        assert!(reg.lookup("nope:1").is_none());
    }
}
