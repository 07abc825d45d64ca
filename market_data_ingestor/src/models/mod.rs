pub mod bar;
pub mod bar_frame;
pub mod request_params;
pub mod timeframe;
