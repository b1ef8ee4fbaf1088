//! Built-in JSON data renderer: the resolved page as a data artifact, for
//! client-side navigation and search indexes.

use super::{RenderArtifact, Renderer, ResolvedPage, RouteContext};
use crate::diagnostics::Diagnostic;
use serde_json::json;

pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn extension(&self) -> &str {
        "json"
    }

    fn content_type(&self) -> &str {
        "application/json"
    }

    fn render(
        &self,
        page: &ResolvedPage<'_>,
        ctx: &RouteContext<'_>,
    ) -> Result<RenderArtifact, Vec<Diagnostic>> {
        let data = json!({
            "route": ctx.route.path,
            "locale": ctx.route.locale,
            "source": page.document.id,
            "meta": page.document.meta,
            "alternates": ctx.route.alternates,
            "components": page.components,
            "contentNodes": page.document.content_nodes(),
            "body": page.body,
        });
        let mut bytes = serde_json::to_vec_pretty(&data)
            .map_err(|e| vec![ctx.fail(format!("could not serialize page data: {e}"))])?;
        bytes.push(b'\n');
        Ok(RenderArtifact::new(String::new(), ctx.target, self.content_type(), bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::render::resolve_page;
    use crate::test_helpers::*;
    use crate::types::Route;

    #[test]
    fn data_artifact_carries_route_meta_and_body() {
        let docs = doc_map(vec![
            with_body(page("content/post", "Post"), vec![comp("card"), asset("/img/a.png")]),
            component("card", &[], vec![text("card")]),
        ]);
        let route = Route {
            path: "/post".into(),
            source: "content/post".into(),
            locale: "en".into(),
            targets: vec!["json".into()],
            alternates: Vec::new(),
        };
        let config = SiteConfig::default();
        let page = resolve_page(&docs["content/post"], &docs).unwrap();
        let ctx = RouteContext {
            route: &route,
            target: "json",
            config: &config,
            has_theme: false,
        };
        let artifact = JsonRenderer.render(&page, &ctx).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&artifact.bytes).unwrap();

        assert_eq!(value["route"], "/post");
        assert_eq!(value["meta"]["title"], "Post");
        assert_eq!(value["components"][0], "card");
        assert_eq!(value["body"][0]["kind"], "text");
        assert_eq!(value["contentNodes"][1]["kind"], "asset-reference");
        assert_eq!(artifact.content_type, "application/json");
    }
}
