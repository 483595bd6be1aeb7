// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration bits and pin functions for PIC32MX/PIC32MZ projects.

#[macro_use]
extern crate log;

pub mod config;
pub mod device;
pub mod pinmap;
pub mod render;
pub mod report;
pub mod util;
pub mod validate;

pub use config::{ConfigError, DeviceConfig};
pub use device::Variant;
pub use pinmap::{Catalog, CatalogError};
pub use render::{RenderError, TemplateEngine};
pub use validate::ValidationError;
