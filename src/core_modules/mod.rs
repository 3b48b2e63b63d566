pub mod color_sampler;
pub mod pixel;
pub mod quantized_color;
pub mod session;
pub mod tap_resolver;
pub mod timers;
pub mod utils;
