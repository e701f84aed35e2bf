//! Per-second pricing of generated video, in USD.

use vidbatch_abstraction::{VideoModel, VideoSize};

pub const SORA_2_PER_SECOND: f64 = 0.10;
pub const SORA_2_PRO_PER_SECOND: f64 = 0.30;
pub const SORA_2_PRO_HIGH_RES_PER_SECOND: f64 = 0.50;

/// Price of one second of video for a model and size.
pub const fn price_per_second(model: VideoModel, size: VideoSize) -> f64 {
    match model {
        VideoModel::Sora2 => SORA_2_PER_SECOND,
        VideoModel::Sora2Pro if size.is_high_res() => SORA_2_PRO_HIGH_RES_PER_SECOND,
        VideoModel::Sora2Pro => SORA_2_PRO_PER_SECOND,
    }
}

/// Nominal price of a clip.
pub fn clip_cost(model: VideoModel, size: VideoSize, seconds: u32) -> f64 {
    price_per_second(model, size) * f64::from(seconds)
}
