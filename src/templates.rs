use askama::Template;
use axum::response::Html;
use tracing::error;

pub fn render<T: Template>(template: &T) -> Html<String> {
    Html(template.render().unwrap_or_else(|e| {
        error!("Template render error: {}", e);
        "Template render error".to_string()
    }))
}

#[derive(Template)]
#[template(path = "forbidden.html")]
pub struct ForbiddenTemplate {
    pub title: String,
    pub user_name: String,
}
