//! Modules compiled into the host, and the catalog types manifests can name.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::info;

use orator_core::module::{
    FactoryCatalog, FnFactory, Module, ModuleDeclaration, ModuleError, ModuleResult,
    ModuleRuntime, StaticUnit,
};
use orator_core::collab::completion;
use orator_core::{CommandContext, ServerState, SpeechService};

/// Name of the unit holding the built-in modules.
pub const BUILTIN_UNIT: &str = "builtin";

pub fn console_context(content: &str) -> CommandContext {
    CommandContext {
        author_id: "console".to_string(),
        channel_id: "console".to_string(),
        server_id: None,
        content: content.to_string(),
    }
}

/// Cleans up chat markup before it is spoken.
pub struct MessageParser;

impl MessageParser {
    /// `<@123>` → `someone`, `<:wave:456>` → `wave`, runs of whitespace → one space.
    pub fn parse(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find('<') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            match tail.find('>') {
                Some(end) => {
                    out.push_str(&Self::replace_markup(&tail[1..end]).unwrap_or_else(|| tail[..=end].to_string()));
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push_str(tail);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn replace_markup(inner: &str) -> Option<String> {
        if let Some(id) = inner.strip_prefix('@') {
            let id = id.trim_start_matches('!');
            return id.chars().all(|c| c.is_ascii_digit()).then(|| "someone".to_string());
        }
        let mut parts = inner.trim_start_matches('a').split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(""), Some(name), Some(_id)) if !name.is_empty() => Some(name.to_string()),
            _ => None,
        }
    }
}

#[async_trait]
impl Module for MessageParser {
    fn name(&self) -> &str {
        "MessageParser"
    }
}

/// `say <text>` and `leave`
pub struct SpeechModule {
    speech: Arc<SpeechService>,
}

#[async_trait]
impl Module for SpeechModule {
    fn name(&self) -> &str {
        "Speech"
    }

    fn commands(&self) -> Vec<String> {
        vec!["say".to_string(), "leave".to_string()]
    }

    async fn handle(&self, command: &str, input: &str) -> ModuleResult<Option<String>> {
        if command == "leave" {
            let state = ServerState {
                server_id: "console".to_string(),
                voice_channel_id: None,
            };
            self.speech
                .play_channel_timeout_message(
                    &state,
                    completion(|| async { info!(target = "orator_host", "Left voice channel") }),
                )
                .await;
            return Ok(None);
        }

        let ctx = console_context(input);
        let text = MessageParser::parse(input);
        if text.is_empty() {
            return Ok(Some(format!("{}, say what?", ctx.mention())));
        }
        match self.speech.say(&ctx, &text, None, false).await {
            Ok(()) => Ok(None),
            Err(e) => Ok(Some(e.user_message(&ctx.mention()))),
        }
    }
}

/// `reload [module]` and `modules`
pub struct AdminModule {
    runtime: Weak<ModuleRuntime>,
}

impl AdminModule {
    fn runtime(&self) -> ModuleResult<Arc<ModuleRuntime>> {
        self.runtime.upgrade().ok_or_else(|| ModuleError::Command {
            module: "Admin".to_string(),
            reason: "module runtime has shut down".to_string(),
        })
    }
}

#[async_trait]
impl Module for AdminModule {
    fn name(&self) -> &str {
        "Admin"
    }

    fn commands(&self) -> Vec<String> {
        vec!["reload".to_string(), "modules".to_string()]
    }

    async fn handle(&self, command: &str, input: &str) -> ModuleResult<Option<String>> {
        let runtime = self.runtime()?;
        match command {
            "modules" => Ok(Some(runtime.registry.names().await.join(", "))),
            "reload" => {
                let name = input.trim();
                if name.is_empty() {
                    let summary = runtime.lifecycle.reload_all().await;
                    return Ok(Some(format!(
                        "Loaded {}/{} modules.",
                        summary.succeeded, summary.total
                    )));
                }
                match runtime.lifecycle.reload_one(name).await {
                    Ok(()) => Ok(Some(format!("Reloaded {}.", name))),
                    Err(e) => Ok(Some(e.to_string())),
                }
            }
            other => Err(ModuleError::Command {
                module: "Admin".to_string(),
                reason: format!("unknown command '{}'", other),
            }),
        }
    }
}

/// Canned phrases: each key of the `phrases` kwarg table becomes a command.
pub struct PhrasesModule {
    name: String,
    phrases: BTreeMap<String, String>,
    speech: Arc<SpeechService>,
}

#[async_trait]
impl Module for PhrasesModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn commands(&self) -> Vec<String> {
        self.phrases.keys().cloned().collect()
    }

    async fn handle(&self, command: &str, input: &str) -> ModuleResult<Option<String>> {
        let Some(text) = self.phrases.get(command) else {
            return Ok(None);
        };
        let ctx = console_context(input);
        match self.speech.say(&ctx, text, None, true).await {
            Ok(()) => Ok(None),
            Err(e) => Ok(Some(e.user_message(&ctx.mention()))),
        }
    }
}

fn phrases_from(kwargs: &serde_json::Map<String, Value>) -> ModuleResult<BTreeMap<String, String>> {
    let table = kwargs
        .get("phrases")
        .and_then(Value::as_object)
        .ok_or_else(|| ModuleError::Construction {
            name: "Phrases".to_string(),
            reason: "expected a `phrases` table".to_string(),
        })?;
    Ok(table
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect())
}

/// Make every host type constructible by name.
pub fn install_factories(
    catalog: &FactoryCatalog,
    speech: Arc<SpeechService>,
    runtime: Weak<ModuleRuntime>,
) {
    catalog.install(Arc::new(FnFactory::new("MessageParser", |_, _| {
        Ok(Arc::new(MessageParser) as Arc<dyn Module>)
    })));

    let s = speech.clone();
    catalog.install(Arc::new(FnFactory::new("Speech", move |_, _| {
        Ok(Arc::new(SpeechModule { speech: s.clone() }) as Arc<dyn Module>)
    })));

    catalog.install(Arc::new(FnFactory::new("Admin", move |_, _| {
        Ok(Arc::new(AdminModule {
            runtime: runtime.clone(),
        }) as Arc<dyn Module>)
    })));

    catalog.install(Arc::new(FnFactory::new("Phrases", move |args, kwargs| {
        let name = args
            .first()
            .and_then(Value::as_str)
            .unwrap_or("Phrases")
            .to_string();
        Ok(Arc::new(PhrasesModule {
            name,
            phrases: phrases_from(kwargs)?,
            speech: speech.clone(),
        }) as Arc<dyn Module>)
    })));
}

/// Register built-ins in dependency order: the parser before its users.
pub async fn register_builtins(
    runtime: &ModuleRuntime,
    catalog: Arc<FactoryCatalog>,
) -> ModuleResult<()> {
    let declarations = vec![
        ModuleDeclaration::new("MessageParser", false),
        ModuleDeclaration::new("Speech", true),
        ModuleDeclaration::new("Admin", true),
    ];
    let unit = Arc::new(StaticUnit::new(BUILTIN_UNIT, declarations.clone(), catalog));
    for declaration in declarations {
        runtime
            .registry
            .register_declaration(unit.clone(), declaration)
            .await?;
    }
    info!(target = "orator_host", "Registered built-in modules");
    Ok(())
}
