//! Console heads-up display.

use std::io::Write;

use tracing::warn;

use crate::core::collaborators::Hud;

/// Prints the HUD to stdout when shown and tracks what is on screen.
#[derive(Debug, Default)]
pub struct ConsoleHud {
    title: String,
    content: String,
    visible: bool,
    echo: bool,
}

impl ConsoleHud {
    pub fn new() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    /// Track state without printing.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    fn print(&self) {
        let mut out = std::io::stdout().lock();
        let result = if self.title.is_empty() {
            writeln!(out, "{}", self.content)
        } else {
            writeln!(out, "== {} ==\n{}", self.title, self.content)
        };
        if let Err(err) = result {
            warn!(error = %err, "hud write failed");
        }
    }
}

impl Hud for ConsoleHud {
    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn set_content(&mut self, content: &str) {
        self.content = content.to_string();
    }

    fn show(&mut self) {
        self.visible = true;
        if self.echo {
            self.print();
        }
    }

    fn hide(&mut self) {
        self.visible = false;
    }
}
