//! Rhai-backed channel hooks.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rhai::{AST, Dynamic, Engine, EvalAltResult, INT, Map, Scope};
use tracing::{debug, info};

use crate::engine::events::SpeakClass;
use crate::engine::player::ChatPlayer;

use super::hook::{ChannelHooks, HookError, HookPoint, HookResult, SpeakVerdict};

/// Script environments available at once. Exceeding it means scripts are
/// re-entering the gateway too deeply.
pub const DEFAULT_MAX_NESTED_CALLS: usize = 16;

/// Rhai function call depth allowed inside a single evaluation.
pub const DEFAULT_MAX_CALL_LEVELS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLimits {
    pub max_call_levels: usize,
    pub max_nested_calls: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_call_levels: DEFAULT_MAX_CALL_LEVELS,
            max_nested_calls: DEFAULT_MAX_NESTED_CALLS,
        }
    }
}

/// Compiles channel scripts and evaluates their entry points.
///
/// One gateway is shared by every scripted channel.
pub struct HookGateway {
    engine: Engine,
    scripts_dir: PathBuf,
    active: AtomicUsize,
    max_nested_calls: usize,
}

/// A reserved script environment, released on drop.
struct ScriptEnv<'a> {
    active: &'a AtomicUsize,
}

impl Drop for ScriptEnv<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl HookGateway {
    pub fn new(scripts_dir: impl Into<PathBuf>, limits: ScriptLimits) -> Self {
        let mut engine = Engine::new();
        engine.set_max_call_levels(limits.max_call_levels);
        engine.on_print(|text| info!(target: "gamechat::script", "{text}"));
        engine.on_debug(|text, source, pos| {
            debug!(target: "gamechat::script", source = source.unwrap_or("<script>"), %pos, "{text}");
        });

        Self {
            engine,
            scripts_dir: scripts_dir.into(),
            active: AtomicUsize::new(0),
            max_nested_calls: limits.max_nested_calls,
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Load and compile a script file relative to the scripts directory.
    pub fn load_script(self: &Arc<Self>, file: &str) -> HookResult<ScriptHooks> {
        let path = self.scripts_dir.join(file);
        let source = std::fs::read_to_string(&path).map_err(|source| HookError::Io {
            path: path.clone(),
            source,
        })?;
        self.compile(file, &source)
    }

    /// Compile script source into a hook binding. Entry points the script
    /// does not define stay pass-through.
    pub fn compile(self: &Arc<Self>, name: &str, source: &str) -> HookResult<ScriptHooks> {
        let ast = self.engine.compile(source).map_err(|e| HookError::Compile {
            script: name.to_string(),
            reason: e.to_string(),
        })?;

        let bound: HashSet<HookPoint> = HookPoint::ALL
            .into_iter()
            .filter(|point| ast.iter_functions().any(|f| f.name == point.entry_point()))
            .collect();

        debug!(script = name, ?bound, "compiled channel script");

        Ok(ScriptHooks {
            gateway: Arc::clone(self),
            name: name.to_string(),
            ast,
            bound,
        })
    }

    fn reserve_env(&self) -> HookResult<ScriptEnv<'_>> {
        let previous = self.active.fetch_add(1, Ordering::AcqRel);
        if previous >= self.max_nested_calls {
            self.active.fetch_sub(1, Ordering::AcqRel);
            return Err(HookError::CallStackOverflow {
                limit: self.max_nested_calls,
            });
        }
        Ok(ScriptEnv {
            active: &self.active,
        })
    }

    fn call(
        &self,
        unit: &ScriptHooks,
        point: HookPoint,
        args: impl rhai::FuncArgs,
    ) -> HookResult<Dynamic> {
        let _env = self.reserve_env()?;
        let mut scope = Scope::new();
        self.engine
            .call_fn::<Dynamic>(&mut scope, &unit.ast, point.entry_point(), args)
            .map_err(|err| {
                if is_stack_overflow(&err) {
                    HookError::CallDepthExceeded {
                        script: unit.name.clone(),
                        entry_point: point.entry_point(),
                    }
                } else {
                    HookError::Execution {
                        script: unit.name.clone(),
                        entry_point: point.entry_point(),
                        reason: err.to_string(),
                    }
                }
            })
    }
}

fn is_stack_overflow(err: &EvalAltResult) -> bool {
    match err {
        EvalAltResult::ErrorStackOverflow(..) => true,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => is_stack_overflow(inner),
        _ => false,
    }
}

/// The player as scripts see it. Absent guild/party ids are 0.
fn player_map(player: &dyn ChatPlayer) -> Map {
    let guild = player.guild();
    let mut map = Map::new();
    map.insert("id".into(), Dynamic::from_int(INT::from(player.id().0)));
    map.insert("guid".into(), Dynamic::from_int(INT::from(player.guid().0)));
    map.insert("name".into(), Dynamic::from(player.name().to_string()));
    map.insert("premium".into(), Dynamic::from_bool(player.is_premium()));
    map.insert(
        "guild_id".into(),
        Dynamic::from_int(guild.as_ref().map_or(0, |g| INT::from(g.id.0))),
    );
    map.insert(
        "guild_rank".into(),
        Dynamic::from_int(guild.as_ref().map_or(0, |g| INT::from(g.rank_level))),
    );
    map.insert(
        "party_id".into(),
        Dynamic::from_int(player.party().map_or(0, |p| INT::from(p.0))),
    );
    map
}

/// Hooks backed by a compiled script unit.
pub struct ScriptHooks {
    gateway: Arc<HookGateway>,
    name: String,
    ast: AST,
    bound: HashSet<HookPoint>,
}

impl ScriptHooks {
    pub fn is_bound(&self, point: HookPoint) -> bool {
        self.bound.contains(&point)
    }

    fn expect_bool(&self, point: HookPoint, value: Dynamic) -> HookResult<bool> {
        value.as_bool().map_err(|found| HookError::UnexpectedReturn {
            script: self.name.clone(),
            entry_point: point.entry_point(),
            found: found.to_string(),
            expected: "bool",
        })
    }

    fn reclassify(&self, raw: INT) -> HookResult<SpeakVerdict> {
        SpeakClass::try_from(raw)
            .map(SpeakVerdict::AllowAs)
            .map_err(|raw| HookError::UnexpectedReturn {
                script: self.name.clone(),
                entry_point: HookPoint::OnSpeak.entry_point(),
                found: format!("speak class {raw}"),
                expected: "a known speak class",
            })
    }

    fn evaluate_bool(&self, point: HookPoint, player: &dyn ChatPlayer) -> HookResult<bool> {
        if !self.is_bound(point) {
            return Ok(true);
        }
        let value = self.gateway.call(self, point, (player_map(player),))?;
        self.expect_bool(point, value)
    }
}

impl ChannelHooks for ScriptHooks {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_join(&self, player: &dyn ChatPlayer) -> HookResult<bool> {
        self.evaluate_bool(HookPoint::CanJoin, player)
    }

    fn on_join(&self, player: &dyn ChatPlayer) -> HookResult<bool> {
        self.evaluate_bool(HookPoint::OnJoin, player)
    }

    fn on_leave(&self, player: &dyn ChatPlayer) -> HookResult<bool> {
        self.evaluate_bool(HookPoint::OnLeave, player)
    }

    /// Accepts `bool`, a speak class number (allow with that class) or
    /// `[bool, class]`.
    fn on_speak(
        &self,
        player: &dyn ChatPlayer,
        class: SpeakClass,
        text: &str,
    ) -> HookResult<SpeakVerdict> {
        if !self.is_bound(HookPoint::OnSpeak) {
            return Ok(SpeakVerdict::Allow);
        }

        let value = self.gateway.call(
            self,
            HookPoint::OnSpeak,
            (
                player_map(player),
                INT::from(class.as_u8()),
                text.to_string(),
            ),
        )?;

        if let Ok(allowed) = value.as_bool() {
            return Ok(if allowed {
                SpeakVerdict::Allow
            } else {
                SpeakVerdict::Deny
            });
        }
        if let Ok(raw) = value.as_int() {
            return self.reclassify(raw);
        }
        if let Ok(parts) = value.clone().into_array()
            && let [allowed, raw] = parts.as_slice()
            && let (Ok(allowed), Ok(raw)) = (allowed.as_bool(), raw.as_int())
        {
            return if allowed {
                self.reclassify(raw)
            } else {
                Ok(SpeakVerdict::Deny)
            };
        }

        Err(HookError::UnexpectedReturn {
            script: self.name.clone(),
            entry_point: HookPoint::OnSpeak.entry_point(),
            found: value.type_name().to_string(),
            expected: "bool, speak class or [bool, speak class]",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::player::{GuildId, GuildInfo};
    use crate::engine::test_support::test_player;

    fn gateway() -> Arc<HookGateway> {
        Arc::new(HookGateway::new(".", ScriptLimits::default()))
    }

    #[test]
    fn undefined_entry_points_pass_through() {
        let hooks = gateway()
            .compile("empty", "fn unrelated() { 1 }")
            .unwrap();
        let (player, _rx) = test_player(1, "Alice");

        for point in HookPoint::ALL {
            assert!(!hooks.is_bound(point));
        }
        assert!(hooks.can_join(&*player).unwrap());
        assert!(hooks.on_join(&*player).unwrap());
        assert!(hooks.on_leave(&*player).unwrap());
        assert_eq!(
            hooks.on_speak(&*player, SpeakClass::ChannelY, "hi").unwrap(),
            SpeakVerdict::Allow
        );
    }

    #[test]
    fn can_join_sees_player_fields() {
        let hooks = gateway()
            .compile("premium", "fn canJoin(player) { player.premium }")
            .unwrap();
        let (player, _rx) = test_player(1, "Alice");

        assert!(!hooks.can_join(&*player).unwrap());
        player.set_premium(true);
        assert!(hooks.can_join(&*player).unwrap());
    }

    #[test]
    fn on_speak_reclassifies_officers() {
        let source = r#"
            fn onSpeak(player, class, text) {
                if player.guild_rank > 1 { 8 } else { true }
            }
        "#;
        let hooks = gateway().compile("guild", source).unwrap();
        let (player, _rx) = test_player(1, "Alice");

        assert_eq!(
            hooks.on_speak(&*player, SpeakClass::ChannelY, "hi").unwrap(),
            SpeakVerdict::Allow
        );

        player.set_guild(Some(GuildInfo {
            id: GuildId(42),
            name: "Knights".into(),
            rank_level: 3,
            motd: String::new(),
        }));
        assert_eq!(
            hooks.on_speak(&*player, SpeakClass::ChannelY, "hi").unwrap(),
            SpeakVerdict::AllowAs(SpeakClass::ChannelO)
        );
    }

    #[test]
    fn on_speak_accepts_pair_and_denies_on_text() {
        let source = r#"
            fn onSpeak(player, class, text) {
                if text.contains("spam") { [false, class] } else { [true, 14] }
            }
        "#;
        let hooks = gateway().compile("filter", source).unwrap();
        let (player, _rx) = test_player(1, "Alice");

        assert_eq!(
            hooks.on_speak(&*player, SpeakClass::ChannelY, "buy spam").unwrap(),
            SpeakVerdict::Deny
        );
        assert_eq!(
            hooks.on_speak(&*player, SpeakClass::ChannelY, "hello").unwrap(),
            SpeakVerdict::AllowAs(SpeakClass::ChannelR1)
        );
    }

    #[test]
    fn unknown_speak_class_is_an_error() {
        let hooks = gateway()
            .compile("bad", "fn onSpeak(player, class, text) { 99 }")
            .unwrap();
        let (player, _rx) = test_player(1, "Alice");

        let err = hooks
            .on_speak(&*player, SpeakClass::ChannelY, "hi")
            .unwrap_err();
        assert!(matches!(err, HookError::UnexpectedReturn { .. }));
    }

    #[test]
    fn wrong_return_type_is_an_error() {
        let hooks = gateway()
            .compile("bad", r#"fn onJoin(player) { "yes" }"#)
            .unwrap();
        let (player, _rx) = test_player(1, "Alice");

        assert!(matches!(
            hooks.on_join(&*player),
            Err(HookError::UnexpectedReturn { .. })
        ));
    }

    #[test]
    fn runaway_recursion_is_reported() {
        let source = r#"
            fn deep(n) { deep(n + 1) }
            fn canJoin(player) { deep(0) }
        "#;
        let gateway = Arc::new(HookGateway::new(
            ".",
            ScriptLimits {
                max_call_levels: 8,
                max_nested_calls: DEFAULT_MAX_NESTED_CALLS,
            },
        ));
        let hooks = gateway.compile("recursive", source).unwrap();
        let (player, _rx) = test_player(1, "Alice");

        assert!(matches!(
            hooks.can_join(&*player),
            Err(HookError::CallDepthExceeded { .. })
        ));
    }

    #[test]
    fn exhausted_environments_fail() {
        let gateway = Arc::new(HookGateway::new(
            ".",
            ScriptLimits {
                max_call_levels: DEFAULT_MAX_CALL_LEVELS,
                max_nested_calls: 2,
            },
        ));
        let hooks = gateway
            .compile("gate", "fn canJoin(player) { true }")
            .unwrap();
        let (player, _rx) = test_player(1, "Alice");

        let first = gateway.reserve_env().unwrap();
        let second = gateway.reserve_env().unwrap();
        assert!(matches!(
            hooks.can_join(&*player),
            Err(HookError::CallStackOverflow { limit: 2 })
        ));

        drop(first);
        drop(second);
        assert!(hooks.can_join(&*player).unwrap());
    }

    #[test]
    fn compile_errors_are_reported() {
        let result = gateway().compile("broken", "fn canJoin(player) {");
        assert!(matches!(result, Err(HookError::Compile { .. })));
    }

    #[test]
    fn load_script_reads_from_scripts_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("help.rhai"), "fn onJoin(player) { false }").unwrap();
        let gateway = Arc::new(HookGateway::new(dir.path(), ScriptLimits::default()));

        let hooks = gateway.load_script("help.rhai").unwrap();
        let (player, _rx) = test_player(1, "Alice");
        assert!(!hooks.on_join(&*player).unwrap());

        assert!(matches!(
            gateway.load_script("missing.rhai"),
            Err(HookError::Io { .. })
        ));
    }
}
