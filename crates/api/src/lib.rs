//! # Scenario API
//!
//! 基于 Axum 的 HTTP 接口：任务提交与查询、场景管理、Worker 状态和登录。
//!
//! 每个路径都可以带上场景前缀，例如 `/s1/api/tasks` 访问场景 `s1` 的任务
//! 账本。前缀解析发生在路由匹配之前（见 [`routing`]），因此场景路由层包裹
//! 在整个路由器之外：
//!
//! ```text
//! TraceLayer → request_logging → route_scenario → Router
//! ```
//!
//! ## 认证
//!
//! - `Authorization: Basic ...`：每个请求校验密码并重新计算场景能力映射
//! - `Authorization: Bearer <token>`：`POST /api/auth/login` 返回的会话令牌
//!
//! 访问没有能力条目的场景返回 403。

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod routing;

use axum::Router;
use scenario_core::ApiConfig;

use middleware::{cors_layer, request_logging, trace_layer};
use routes::create_routes;
use routing::route_scenario;

pub use routes::AppState;
pub use routing::ScenarioContext;

/// 创建完整的API应用
///
/// 路由器作为 fallback 服务挂在外层路由器之下，场景路由中间件在内层
/// 路由匹配之前改写请求路径。
pub fn create_app(state: AppState, api: &ApiConfig, metrics_endpoint: &str) -> Router {
    let routes = create_routes(state.clone(), metrics_endpoint);

    let app = Router::new()
        .fallback_service(routes)
        .layer(axum::middleware::from_fn_with_state(
            state.routing.clone(),
            route_scenario,
        ))
        .layer(axum::middleware::from_fn(request_logging));

    let app = if api.cors_enabled {
        app.layer(cors_layer())
    } else {
        app
    };
    app.layer(trace_layer())
}
