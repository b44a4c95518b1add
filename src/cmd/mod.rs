//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Run`            |
//! | `images` | `Images`         |
//! | `config` | `Config`         |

pub mod config;
pub mod images;
pub mod run;

pub use config::cmd_config;
pub use images::cmd_images;
pub use run::cmd_run;
