// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

pub mod attachment;
pub mod classifier;
pub mod personalize;
pub mod rate;
pub mod recipient;
pub mod transport;
