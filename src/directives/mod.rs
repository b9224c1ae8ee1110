//! Directive passes, in pipeline order.
//!
//! | Pass        | Tags                         |
//! |-------------|------------------------------|
//! | include     | `<zin-include>`              |
//! | set         | `<zin-set>`                  |
//! | data        | `<zin-data>`                 |
//! | time        | `<zin-time>`                 |
//! | random      | `<zin-random>`               |
//! | hash        | `<zin-hash>`                 |
//! | crypt       | `<zin-crypt>`                |
//! | repeat      | `<zin-repeat>` blocks        |
//! | form        | `<zin-form>` blocks          |
//! | vars        | `{{ key \|\| default }}`     |
//! | unsupported | any other `<zin...>`         |

mod crypt;
mod data;
pub mod form;
mod hash;
mod include;
mod random;
mod repeat;
mod set;
mod time;
mod unsupported;
pub mod vars;

pub use crypt::Crypt;
pub use data::Data;
pub use form::Form;
pub use hash::Hash;
pub use include::Include;
pub use random::Random;
pub use repeat::Repeat;
pub use set::SetVar;
pub use time::Time;
pub use unsupported::Unsupported;
pub use vars::Vars;

use crate::engine::scan::{self, Tag};
use crate::engine::{Pipeline, RenderContext};

/// The full pipeline served pages go through.
pub fn standard() -> Pipeline {
    Pipeline::new(vec![
        Box::new(Include),
        Box::new(SetVar),
        Box::new(Data),
        Box::new(Time),
        Box::new(Random),
        Box::new(Hash),
        Box::new(Crypt),
        Box::new(Repeat),
        Box::new(Form),
        Box::new(Vars),
        Box::new(Unsupported),
    ])
}

/// Rewrite every `<zin-NAME>` tag with `f`. Malformed tags of that name become
/// inline errors without reaching `f`.
fn rewrite_tags<F>(document: &str, name: &str, cx: &mut RenderContext<'_>, mut f: F) -> String
where
    F: FnMut(&Tag<'_>, &mut RenderContext<'_>) -> String,
{
    scan::replace_tags_where(
        document,
        |tag| tag.name == name,
        |tag| {
            if tag.malformed {
                return cx.tag_error(
                    tag.text,
                    format!("Malformed <zin-{name}> tag, check the quoting of its attributes."),
                );
            }
            f(tag, cx)
        },
    )
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for driving single passes in tests.

    use crate::engine::services::{ContentFs, DiskFs, Fetcher, ModuleRunner, Services};
    use crate::engine::value::Imported;
    use crate::engine::{Directive, PipelineConfig, RenderContext, RequestContext};
    use crate::utils::fetch::{DataSource, FetchError};
    use crate::utils::modules::ModuleError;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Instant;

    /// Fetcher answering every source with the same import.
    pub struct StaticFetcher(pub Imported);

    impl Fetcher for StaticFetcher {
        fn fetch(&self, _: &DataSource, _: Option<Instant>) -> Result<Imported, FetchError> {
            Ok(self.0.clone())
        }
    }

    /// Module runner that knows no modules.
    pub struct NoModules;

    impl ModuleRunner for NoModules {
        fn run(&self, _: &Path, tag: &str, _: Option<Instant>) -> Result<String, ModuleError> {
            Err(ModuleError::NotFound(tag.to_owned()))
        }
    }

    pub fn services() -> Services {
        Services {
            fs: Arc::new(DiskFs) as Arc<dyn ContentFs>,
            fetcher: Arc::new(StaticFetcher(Imported::Text(String::new()))),
            modules: Arc::new(NoModules),
        }
    }

    pub fn config(show_errors: bool) -> PipelineConfig {
        PipelineConfig {
            source: "/site/index.html".into(),
            show_errors,
            max_include_depth: 5,
            time_zone: "UTC".into(),
        }
    }

    /// Apply one pass with inline errors enabled.
    pub fn apply(pass: &dyn Directive, document: &str, request: &mut RequestContext) -> String {
        apply_with(pass, document, request, &services())
    }

    pub fn apply_with(
        pass: &dyn Directive,
        document: &str,
        request: &mut RequestContext,
        services: &Services,
    ) -> String {
        let config = config(true);
        let mut cx = RenderContext {
            request,
            config: &config,
            services,
        };
        pass.apply(document.to_owned(), &mut cx)
    }
}
