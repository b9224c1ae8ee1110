//! Page rendering engine.
//!
//! # Flow
//!
//! ```text
//! content file ──► compose (templates, title) ──► pipeline (directive passes) ──► html
//!                                                     │
//!                                            RequestContext (vars, error, deadline)
//! ```
//!
//! The directive passes themselves live in [`crate::directives`].

pub mod compose;
pub mod context;
mod error;
pub mod pipeline;
pub mod resolve;
pub mod scan;
pub mod services;
pub mod value;

pub use context::{RequestContext, ServerError};
pub use error::EngineError;
pub use pipeline::{Directive, Pipeline, PipelineConfig, RenderContext};
pub use services::Services;

use crate::config::RenderConfig;

/// Compose the request's page and run it through `pipeline`.
///
/// A global error recorded by a pass is left on `request`; the caller decides
/// how to answer.
pub fn render_page(
    request: &mut RequestContext,
    render: &RenderConfig,
    pipeline: &Pipeline,
    services: &Services,
) -> Result<String, EngineError> {
    let document = compose::compose_page(
        services.fs.as_ref(),
        &request.root,
        &request.path,
        &request.content_source,
        &render.template,
    )?;
    let config = PipelineConfig::for_request(request, render);
    Ok(pipeline.run(document, request, &config, services))
}
