//! 场景路由
//!
//! 在路由匹配之前执行：按配置顺序检查非默认场景名，第一个匹配
//! `/<name>/` 前缀的场景必须处于 InUse 状态，否则直接返回 404，
//! 不会回退到默认场景。匹配成功时去掉前缀（保留查询串），并把
//! [`ScenarioContext`] 写入请求扩展；没有匹配时绑定默认场景，路径不变。

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, uri::PathAndQuery, Uri},
    middleware::Next,
    response::Response,
};
use scenario_domain::ScenarioRegistry;
use tracing::debug;

use crate::error::{ApiError, ApiResult};

/// 当前请求绑定的场景
///
/// 只能由路由中间件构造，处理器通过提取器读取。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioContext {
    name: String,
    prefix: Option<String>,
}

impl ScenarioContext {
    fn default_scenario(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: None,
        }
    }

    fn prefixed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: Some(format!("/{name}")),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 被去掉的路径前缀，默认场景为 `None`
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn is_default(&self) -> bool {
        self.prefix.is_none()
    }
}

impl<S> FromRequestParts<S> for ScenarioContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ScenarioContext>()
            .cloned()
            .ok_or_else(|| ApiError::Internal("请求未经过场景路由".to_string()))
    }
}

#[derive(Clone)]
pub struct ScenarioRouting {
    registry: Arc<dyn ScenarioRegistry>,
    candidates: Arc<Vec<String>>,
}

impl ScenarioRouting {
    pub fn new(registry: Arc<dyn ScenarioRegistry>) -> Self {
        let candidates = registry
            .descriptors()
            .iter()
            .filter(|d| !registry.is_default(&d.name))
            .map(|d| d.name.clone())
            .collect();
        Self {
            registry,
            candidates: Arc::new(candidates),
        }
    }

    /// 第一个前缀匹配的场景名及去掉前缀后的路径
    pub fn match_prefix<'a>(&self, path: &'a str) -> Option<(&str, &'a str)> {
        self.candidates.iter().find_map(|name| {
            path.strip_prefix('/')
                .and_then(|rest| rest.strip_prefix(name.as_str()))
                .filter(|rest| rest.starts_with('/'))
                .map(|rest| (name.as_str(), rest))
        })
    }

    /// 解析请求路径，返回绑定的场景以及需要改写的路径
    pub async fn resolve(&self, path: &str) -> ApiResult<(ScenarioContext, Option<String>)> {
        let Some((name, stripped)) = self.match_prefix(path) else {
            return Ok((
                ScenarioContext::default_scenario(self.registry.default_scenario()),
                None,
            ));
        };

        let row = self.registry.scenarios().await?.find(name).await?;
        match row {
            Some(scenario) if scenario.is_in_use() => {
                Ok((ScenarioContext::prefixed(name), Some(stripped.to_string())))
            }
            Some(scenario) => {
                debug!("场景 {} 状态为 {}，拒绝请求 {}", name, scenario.status, path);
                Err(ApiError::NotFound(format!("场景 '{name}' 未在使用中")))
            }
            None => Err(ApiError::NotFound(format!("场景 '{name}' 不存在"))),
        }
    }
}

fn rewrite_path(uri: &Uri, path: &str) -> ApiResult<Uri> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse::<PathAndQuery>()
            .map_err(|e| ApiError::BadRequest(format!("无效的请求路径: {e}")))?,
    );
    Uri::from_parts(parts).map_err(|e| ApiError::BadRequest(format!("无效的请求路径: {e}")))
}

/// 场景路由中间件，需包裹在整个路由器之外
pub async fn route_scenario(
    State(routing): State<ScenarioRouting>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let (context, rewritten) = routing.resolve(request.uri().path()).await?;
    if let Some(path) = rewritten {
        *request.uri_mut() = rewrite_path(request.uri(), &path)?;
    }

    request.extensions_mut().insert(context.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(context);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_testing_utils::MockScenarioRegistry;

    fn routing() -> ScenarioRouting {
        ScenarioRouting::new(Arc::new(MockScenarioRegistry::postgres(&[
            "default", "s1", "s10",
        ])))
    }

    #[test]
    fn test_match_prefix_requires_full_segment() {
        let routing = routing();
        assert_eq!(
            routing.match_prefix("/s1/api/tasks"),
            Some(("s1", "/api/tasks"))
        );
        assert_eq!(routing.match_prefix("/s10/x"), Some(("s10", "/x")));
        assert_eq!(routing.match_prefix("/s1"), None);
        assert_eq!(routing.match_prefix("/s100/x"), None);
        assert_eq!(routing.match_prefix("/default/api/tasks"), None);
        assert_eq!(routing.match_prefix("/api/tasks"), None);
    }

    #[test]
    fn test_rewrite_keeps_query() {
        let uri: Uri = "/s1/api/tasks?limit=5".parse().unwrap();
        let rewritten = rewrite_path(&uri, "/api/tasks").unwrap();
        assert_eq!(rewritten.path(), "/api/tasks");
        assert_eq!(rewritten.query(), Some("limit=5"));
    }

    #[tokio::test]
    async fn test_resolve_requires_in_use() {
        let registry = Arc::new(MockScenarioRegistry::postgres(&["default", "s1"]));
        let routing = ScenarioRouting::new(registry.clone());

        let err = routing.resolve("/s1/reports/x").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        registry.set_status("s1", scenario_domain::ScenarioStatus::InUse);
        let (ctx, path) = routing.resolve("/s1/reports/x").await.unwrap();
        assert_eq!(ctx.name(), "s1");
        assert_eq!(ctx.prefix(), Some("/s1"));
        assert_eq!(path.as_deref(), Some("/reports/x"));

        let (ctx, path) = routing.resolve("/reports/x").await.unwrap();
        assert!(ctx.is_default());
        assert_eq!(ctx.name(), "default");
        assert!(path.is_none());
    }
}
