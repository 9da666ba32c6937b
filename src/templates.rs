use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use minijinja::{Environment, path_loader};
use minijinja_autoreload::AutoReloader;

pub type Templates = Arc<AutoReloader>;

pub fn create(template_path: impl Into<String>) -> Templates {
    let template_path = template_path.into();
    Arc::new(AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        let template_path = template_path.as_str();
        notifier.watch_path(template_path, true);
        env.set_loader(path_loader(template_path));
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_filter("date", date);
        env.add_filter("timeago", timeago);
        Ok(env)
    }))
}

pub fn render<S>(templates: &Templates, template_name: &str, context: S) -> Result<String>
where S: serde::Serialize {
    let env = templates.acquire_env().context("Failed to get template environment")?;
    let template = env.get_template(template_name).context("Failed to get template")?;
    template.render(context).context("Failed to render template")
}

fn parse(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok()
}

fn timeago(value: String) -> String {
    let Some(value) = parse(&value) else {
        return format!("[invalid {}]", value);
    };
    timeago::Formatter::new().convert_chrono(value, Utc::now())
}

fn date(value: String, format: Option<String>) -> String {
    let Some(value) = parse(&value) else {
        return format!("[invalid {}]", value);
    };
    value.format(format.as_deref().unwrap_or("%Y-%m-%d %H:%M:%S %:z")).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_formats_engine_timestamps() {
        assert_eq!(
            date("2024-12-14T10:30:00Z".to_string(), None),
            "2024-12-14 10:30:00 +00:00"
        );
        assert_eq!(
            date("2024-12-14T10:30:00.123456Z".to_string(), Some("%H:%M".to_string())),
            "10:30"
        );
    }

    #[test]
    fn invalid_timestamps_render_a_marker_instead_of_failing() {
        assert_eq!(date("soon".to_string(), None), "[invalid soon]");
        assert_eq!(timeago("soon".to_string()), "[invalid soon]");
    }
}
