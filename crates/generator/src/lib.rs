// Site generation: content import, templates, styles, scripts and assets.
// Heavy lifting is delegated to pulldown-cmark, minijinja, grass and
// external command-line tools.

pub mod assets;
pub mod content;
pub mod external;
pub mod markdown;
pub mod render;
pub mod scripts;
pub mod styles;

pub use assets::copy_assets;
pub use content::{import_contents, read_document, write_document};
pub use render::render_site;

/// Development output is readable and wired for live reload; production
/// output is compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Dev,
    Prod,
}
