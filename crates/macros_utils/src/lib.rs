//! Small declarative helpers shared across the workspace.

/// Declare a `routes` function registering the listed actix-web services.
///
/// ```ignore
/// macros_utils::routes! {
///     route health_route,
///     route list_results,
/// }
/// ```
#[cfg(feature = "actix")]
#[macro_export]
macro_rules! routes {
    ($(route $handler:path),* $(,)?) => {
        pub fn routes(cfg: &mut ::actix_web::web::ServiceConfig) {
            $(cfg.service($handler);)*
        }
    };
}
