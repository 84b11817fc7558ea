//! Concrete leaf behaviors referenced from protocol documents.

use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::behavior::{Requirements, TaskBehavior};
use crate::core::context::TaskCtx;
use crate::core::error::TaskError;
use crate::core::types::{Binding, MoveDirection, TaskKind};

/// Behavior configuration as written in a protocol document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BehaviorSpec {
    /// HUD text shown for the run phase.
    Instruction { title: String, text: String },
    /// Confirm moves on; `back` returns to the previous sibling.
    NavigationPrompt {
        #[serde(default)]
        text: String,
        #[serde(default = "default_back")]
        back: Binding,
    },
    /// Run-phase seconds written into the repeat context at finish.
    RecordElapsed { key: String },
    /// Copy row columns into the repeat context; all columns when empty.
    RowToContext {
        #[serde(default)]
        columns: Vec<String>,
    },
    /// Pause on the listed 1-based iterations until `key` is pressed.
    BreakPoint { iterations: Vec<u32>, key: Binding },
}

fn default_back() -> Binding {
    Binding::Key("back".to_string())
}

impl BehaviorSpec {
    pub fn instantiate(&self) -> Box<dyn TaskBehavior> {
        match self {
            BehaviorSpec::Instruction { title, text } => Box::new(Instruction {
                title: title.clone(),
                text: text.clone(),
            }),
            BehaviorSpec::NavigationPrompt { text, back } => Box::new(NavigationPrompt {
                text: text.clone(),
                back: back.clone(),
            }),
            BehaviorSpec::RecordElapsed { key } => Box::new(RecordElapsed { key: key.clone() }),
            BehaviorSpec::RowToContext { columns } => Box::new(RowToContext {
                columns: columns.clone(),
            }),
            BehaviorSpec::BreakPoint { iterations, key } => Box::new(BreakPoint {
                iterations: iterations.clone(),
                key: key.clone(),
                holding: false,
            }),
        }
    }

    pub fn requirements(&self) -> Requirements {
        self.instantiate().requirements()
    }

    pub fn type_name(&self) -> &'static str {
        self.instantiate().label()
    }
}

/// Render `template` with the task's row, shared context and iteration.
///
/// Broken templates fall back to the raw text.
pub fn render(template: &str, ctx: &TaskCtx<'_, '_, '_>) -> String {
    let env = Environment::new();
    let rendered = env.render_str(
        template,
        context! {
            task => ctx.name(),
            row => ctx.row().cloned().unwrap_or_default(),
            context => ctx.context().cloned().unwrap_or_default(),
            iteration => ctx.iteration().unwrap_or_default(),
            participant => ctx.settings().participant_id.as_str(),
        },
    );
    match rendered {
        Ok(text) => text,
        Err(err) => {
            warn!(task = ctx.name(), error = %err, "template render failed");
            template.to_string()
        }
    }
}

#[derive(Debug)]
pub struct Instruction {
    title: String,
    text: String,
}

impl TaskBehavior for Instruction {
    fn label(&self) -> &'static str {
        "instruction"
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            hud: true,
            ..Requirements::default()
        }
    }

    fn on_prepare(&mut self, ctx: &mut TaskCtx<'_, '_, '_>) -> Result<(), TaskError> {
        let title = render(&self.title, ctx);
        let text = render(&self.text, ctx);
        if let Some(hud) = ctx.hud() {
            hud.set_title(&title);
            hud.set_content(&text);
            hud.show();
        }
        Ok(())
    }

    fn on_finish(&mut self, ctx: &mut TaskCtx<'_, '_, '_>) {
        if let Some(hud) = ctx.hud() {
            hud.hide();
        }
    }
}

#[derive(Debug)]
pub struct NavigationPrompt {
    text: String,
    back: Binding,
}

impl TaskBehavior for NavigationPrompt {
    fn label(&self) -> &'static str {
        "navigation_prompt"
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            navigable_ancestor: true,
            ..Requirements::default()
        }
    }

    fn default_bindings(&self, kind: TaskKind) -> Vec<Binding> {
        if kind.waits_for_signal() {
            vec![Binding::Confirm, self.back.clone()]
        } else {
            Vec::new()
        }
    }

    fn on_prepare(&mut self, ctx: &mut TaskCtx<'_, '_, '_>) -> Result<(), TaskError> {
        if self.back == Binding::Confirm {
            return Err(TaskError::Behavior {
                task: ctx.name().to_string(),
                id: ctx.id(),
                message: "back binding must differ from confirm".to_string(),
            });
        }
        if self.text.is_empty() {
            return Ok(());
        }
        let text = render(&self.text, ctx);
        if let Some(hud) = ctx.hud() {
            hud.set_content(&text);
            hud.show();
        }
        Ok(())
    }

    fn on_input(&mut self, binding: &Binding, ctx: &mut TaskCtx<'_, '_, '_>) {
        if *binding == self.back {
            ctx.request_move(MoveDirection::Previous);
            ctx.stop();
        } else if *binding == Binding::Confirm {
            ctx.stop();
        }
    }

    fn on_finish(&mut self, ctx: &mut TaskCtx<'_, '_, '_>) {
        if self.text.is_empty() {
            return;
        }
        if let Some(hud) = ctx.hud() {
            hud.hide();
        }
    }
}

#[derive(Debug)]
pub struct RecordElapsed {
    key: String,
}

impl TaskBehavior for RecordElapsed {
    fn label(&self) -> &'static str {
        "record_elapsed"
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            repeat_ancestor: true,
            ..Requirements::default()
        }
    }

    fn on_finish(&mut self, ctx: &mut TaskCtx<'_, '_, '_>) {
        let seconds = format!("{:.3}", ctx.elapsed().as_secs_f64());
        let key = self.key.clone();
        if let Some(context) = ctx.context_mut() {
            if context.contains_key(&key) {
                debug!(key = %key, "context key already set, keeping first value");
            } else {
                context.insert(key, seconds);
            }
        }
    }
}

#[derive(Debug)]
pub struct RowToContext {
    columns: Vec<String>,
}

impl TaskBehavior for RowToContext {
    fn label(&self) -> &'static str {
        "row_to_context"
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            repeat_ancestor: true,
            ..Requirements::default()
        }
    }

    fn on_prepare(&mut self, ctx: &mut TaskCtx<'_, '_, '_>) -> Result<(), TaskError> {
        let name = ctx.name().to_string();
        let Some(row) = ctx.row().cloned() else {
            ctx.log().warn("context", &format!("{name} has no row to copy"));
            return Ok(());
        };
        let mut missing = Vec::new();
        let copied: Vec<(String, String)> = if self.columns.is_empty() {
            row.into_iter().collect()
        } else {
            self.columns
                .iter()
                .filter_map(|column| match row.get(column) {
                    Some(value) => Some((column.clone(), value.clone())),
                    None => {
                        missing.push(column.clone());
                        None
                    }
                })
                .collect()
        };
        if let Some(context) = ctx.context_mut() {
            context.extend(copied);
        }
        for column in missing {
            ctx.log()
                .warn("context", &format!("{name}: row has no column '{column}'"));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct BreakPoint {
    iterations: Vec<u32>,
    key: Binding,
    holding: bool,
}

impl TaskBehavior for BreakPoint {
    fn label(&self) -> &'static str {
        "break_point"
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            input: true,
            repeat_ancestor: true,
            ..Requirements::default()
        }
    }

    fn default_bindings(&self, _kind: TaskKind) -> Vec<Binding> {
        Vec::new()
    }

    fn on_prepare(&mut self, ctx: &mut TaskCtx<'_, '_, '_>) -> Result<(), TaskError> {
        let iteration = ctx.iteration().unwrap_or_default();
        self.holding = self.iterations.contains(&iteration);
        if !self.holding {
            ctx.stop();
            return Ok(());
        }
        debug!(task = ctx.name(), iteration, key = %self.key, "break point holding");
        ctx.register(self.key.clone())
    }

    fn on_input(&mut self, binding: &Binding, ctx: &mut TaskCtx<'_, '_, '_>) {
        if self.holding && *binding == self.key {
            ctx.stop();
        }
    }

    fn on_reset(&mut self) {
        self.holding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::repeat::RepeatController;
    use crate::core::types::Tick;
    use crate::io::table::TableRows;
    use crate::test_support::{Harness, interactive, leaf, row, structural};

    fn behavior(raw: &str) -> BehaviorSpec {
        serde_json::from_str(raw).expect("parse behavior")
    }

    #[test]
    fn specs_parse_by_type_tag() {
        assert_eq!(
            behavior(r#"{ "type": "navigation_prompt" }"#),
            BehaviorSpec::NavigationPrompt {
                text: String::new(),
                back: Binding::Key("back".to_string())
            }
        );
        assert_eq!(
            behavior(r#"{ "type": "break_point", "iterations": [2], "key": "key:space" }"#),
            BehaviorSpec::BreakPoint {
                iterations: vec![2],
                key: Binding::Key("space".to_string())
            }
        );
        assert!(serde_json::from_str::<BehaviorSpec>(r#"{ "type": "teleport" }"#).is_err());
    }

    #[test]
    fn ancestor_needs_follow_the_behavior() {
        assert!(behavior(r#"{ "type": "record_elapsed", "key": "rt" }"#).requirements().repeat_ancestor);
        assert!(behavior(r#"{ "type": "navigation_prompt" }"#).requirements().navigable_ancestor);
        assert!(behavior(r#"{ "type": "instruction", "title": "t", "text": "x" }"#).requirements().hud);
    }

    #[test]
    fn instruction_renders_row_into_hud() {
        let mut harness = Harness::new();
        let spec = behavior(
            r#"{ "type": "instruction", "title": "Trial {{ iteration }}", "text": "Find the {{ row.target }}" }"#,
        );
        let mut repeat = structural(0, "search")
            .with_child(interactive(1, "show").with_boxed_behavior(spec.instantiate()))
            .repeating(RepeatController::table(TableRows::new(vec![row(&[("target", "lamp")])])));

        assert_eq!(harness.tick(&mut repeat), Tick::StillRunning);
        assert_eq!(harness.hud.title(), "Trial 1");
        assert_eq!(harness.hud.content(), "Find the lamp");
        assert!(harness.hud.is_visible());

        harness.input.press(Binding::Confirm);
        assert_eq!(harness.tick(&mut repeat), Tick::Done);
        assert!(!harness.hud.is_visible());
    }

    #[test]
    fn instruction_without_hud_is_fatal() {
        let mut harness = Harness::without_hud();
        let spec = behavior(r#"{ "type": "instruction", "title": "t", "text": "x" }"#);
        let mut task = interactive(1, "show").with_boxed_behavior(spec.instantiate());

        let err = harness.try_tick(&mut task).expect_err("missing hud");
        assert!(matches!(
            err,
            TaskError::MissingCollaborator {
                collaborator: "HUD",
                ..
            }
        ));
    }

    #[test]
    fn record_elapsed_keeps_first_write() {
        let mut harness = Harness::new();
        let first = behavior(r#"{ "type": "record_elapsed", "key": "rt" }"#);
        let second = behavior(r#"{ "type": "record_elapsed", "key": "rt" }"#);
        let mut repeat = structural(0, "block")
            .with_child(interactive(1, "respond").with_boxed_behavior(first.instantiate()))
            .with_child(leaf(2, "again").with_boxed_behavior(second.instantiate()))
            .repeating(RepeatController::fixed(1).with_output("block", vec!["rt".to_string()]));

        harness.tick(&mut repeat);
        harness.tick(&mut repeat);
        harness.input.press(Binding::Confirm);
        assert_eq!(harness.tick(&mut repeat), Tick::Done);

        assert_eq!(harness.log.rows("block"), vec![vec!["2.000".to_string()]]);
    }

    #[test]
    fn row_to_context_copies_selected_columns() {
        let mut harness = Harness::new();
        let spec = behavior(r#"{ "type": "row_to_context", "columns": ["target", "missing"] }"#);
        let rows = TableRows::new(vec![row(&[("target", "tree"), ("x", "1")])]);
        let mut repeat = structural(0, "copy")
            .with_child(leaf(1, "copy_row").with_boxed_behavior(spec.instantiate()))
            .repeating(
                RepeatController::table(rows)
                    .with_output("copy", vec!["target".to_string(), "x".to_string()]),
            );

        assert_eq!(harness.tick(&mut repeat), Tick::Done);
        assert_eq!(
            harness.log.rows("copy"),
            vec![vec!["tree".to_string(), String::new()]]
        );
        assert!(harness.log.has("WARN", "no column 'missing'"));
    }

    #[test]
    fn break_point_holds_only_on_listed_iterations() {
        let mut harness = Harness::new();
        let spec = behavior(r#"{ "type": "break_point", "iterations": [2], "key": "key:space" }"#);
        let mut repeat = structural(0, "blocks")
            .with_child(interactive(1, "pause").with_boxed_behavior(spec.instantiate()))
            .repeating(RepeatController::fixed(3));

        assert_eq!(harness.tick(&mut repeat), Tick::StillRunning);
        assert_eq!(repeat.repeat_progress().expect("progress").iteration, 2);

        harness.input.press(Binding::Confirm);
        assert_eq!(harness.tick(&mut repeat), Tick::StillRunning);
        harness.input.press(Binding::Key("space".to_string()));
        assert_eq!(harness.tick(&mut repeat), Tick::Done);
        assert_eq!(harness.input.registered_count(), 0);
    }

    #[test]
    fn navigation_prompt_rejects_back_on_confirm() {
        let mut harness = Harness::new();
        let spec = behavior(r#"{ "type": "navigation_prompt", "back": "confirm" }"#);
        let mut collection = structural(0, "wizard")
            .with_child(interactive(1, "ask").with_boxed_behavior(spec.instantiate()))
            .navigable();

        let err = harness.try_tick(&mut collection).expect_err("ambiguous binding");
        assert!(matches!(err, TaskError::Behavior { .. }));
        assert!(harness.log.has("ERROR", "back binding must differ from confirm"));
    }

    #[test]
    fn broken_template_falls_back_to_raw_text() {
        let mut harness = Harness::new();
        let spec = behavior(r#"{ "type": "instruction", "title": "{{ oops", "text": "plain" }"#);
        let mut task = interactive(1, "show").with_boxed_behavior(spec.instantiate());

        harness.tick(&mut task);
        assert_eq!(harness.hud.title(), "{{ oops");
        assert_eq!(harness.hud.content(), "plain");
    }
}
