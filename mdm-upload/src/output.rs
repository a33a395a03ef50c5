//! Console rendering for custom apps: pretty JSON or a short human summary.

use anyhow::Result;
use mdm_upload_core::contract::CustomApp;

fn or_dash(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

pub fn render_app(app: &CustomApp, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(app)?);
    }
    let mut lines = vec![
        format!("id:          {}", app.id),
        format!("name:        {}", or_dash(&app.name)),
        format!("version:     {}", or_dash(&app.version)),
        format!("platform:    {}", or_dash(&app.platform)),
        format!("file_key:    {}", or_dash(&app.file_key)),
        format!("updated_at:  {}", or_dash(&app.updated_at)),
    ];
    if let Some(description) = &app.description {
        lines.push(format!("description: {description}"));
    }
    if let Some(script) = &app.postinstall_script {
        lines.push("postinstall_script:".to_string());
        lines.extend(script.lines().map(|l| format!("  {l}")));
    }
    Ok(lines.join("\n"))
}

pub fn render_apps(apps: &[CustomApp], json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(apps)?);
    }
    if apps.is_empty() {
        return Ok("No custom apps found.".to_string());
    }
    let rows: Vec<String> = apps
        .iter()
        .map(|app| {
            format!(
                "{}\t{}\t{}\t{}",
                app.id,
                or_dash(&app.name),
                or_dash(&app.version),
                or_dash(&app.platform)
            )
        })
        .collect();
    Ok(rows.join("\n"))
}
