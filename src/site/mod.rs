//! Per-site files read from the content root.
//!
//! | File           | Module        | Purpose                                   |
//! |----------------|---------------|-------------------------------------------|
//! | `.env`         | [`env`]       | request `env` snapshot                    |
//! | `.zinignore`   | [`ignore`]    | paths never served                        |
//! | `zin.config`   | [`rewrite`]   | `<zin-rewrite path=".." to=".." />` rules |
//! | `robots.txt`   | [`robomap`]   | regenerated with `sitemap.xml`            |

pub mod env;
pub mod ignore;
pub mod rewrite;
pub mod robomap;
