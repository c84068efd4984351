//! Configuration management for HearSay.

mod settings;

pub use settings::{
    ServerSettings, Settings, SttSettings, TranslationSettings, YoutubeSettings,
};
