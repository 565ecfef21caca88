//! CLI command implementations.
//!
//! | Module   | Commands handled          |
//! |----------|---------------------------|
//! | `serve`  | `Serve`                   |
//! | `admin`  | `InitDb`, `CreateUser`    |
//! | `config` | `Config`                  |

pub mod admin;
pub mod config;
pub mod serve;

pub use admin::{cmd_create_user, cmd_init_db};
pub use config::cmd_config;
pub use serve::cmd_serve;
