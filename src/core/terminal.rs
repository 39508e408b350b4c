use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static CALENDAR: Emoji<'_, '_> = Emoji("📅 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

pub fn print_date(day: &str, date: Option<i64>) {
    let shown = match date {
        Some(ts) => style(ts.to_string()).bold().green().to_string(),
        None => style("none").dim().to_string(),
    };
    println!("{} {} -> {}", CALENDAR, style(day).cyan(), shown);
}

pub fn print_goodbye() {
    println!("\n{} {}", SPARKLE, style("Queue drained. Bye!").bold().cyan());
}

enum GuideLine {
    Command(String, String),
    Status(String, String),
    Text(String),
}

/// Titled block of aligned help lines.
pub struct GuideSection {
    title: String,
    lines: Vec<GuideLine>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, about: &str) -> Self {
        self.lines
            .push(GuideLine::Command(name.to_string(), about.to_string()));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.lines
            .push(GuideLine::Status(label.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(GuideLine::Text(text.to_string()));
        self
    }

    pub fn print(self) {
        let width = self
            .lines
            .iter()
            .map(|l| match l {
                GuideLine::Command(name, _) => name.len(),
                _ => 0,
            })
            .max()
            .unwrap_or(0);

        println!("\n {}", style(&self.title).bold().underlined());
        for line in self.lines {
            match line {
                GuideLine::Command(name, about) => println!(
                    "   {:<width$}  {}",
                    style(name).green(),
                    style(about).dim(),
                    width = width
                ),
                GuideLine::Status(label, value) => {
                    println!("   {}: {}", style(label).bold().cyan(), value)
                }
                GuideLine::Text(text) => println!("   {}", text),
            }
        }
    }
}
