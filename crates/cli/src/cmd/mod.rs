mod info;
mod list;
mod manifest;

pub use info::cmd_info;
pub use list::cmd_list;
pub use manifest::{ManifestArgs, cmd_manifest};
