//! Local intents
//!
//! Commands that can be answered without the remote model. Routing is a pure
//! keyword test; answering may call the weather service.

mod weather;

use chrono::{DateTime, TimeZone};

use crate::Config;
use crate::config::Language;

pub use weather::WeatherClient;

/// Keywords that select the time intent
const TIME_KEYWORDS: &[&str] = &["hora", "time"];

/// Keywords that select the weather intent
const WEATHER_KEYWORDS: &[&str] = &["tiempo", "weather", "clima"];

/// A command answerable locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Time,
    Weather,
}

/// Routing decision for a final transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Answer locally
    Local(Intent),
    /// Hand over to the remote model
    Delegate,
}

/// Decide how to answer a transcript
///
/// Time keywords win over weather keywords when both are present.
#[must_use]
pub fn route(transcript: &str, _config: &Config) -> Route {
    let text = transcript.to_lowercase();

    if TIME_KEYWORDS.iter().any(|k| text.contains(k)) {
        return Route::Local(Intent::Time);
    }

    if WEATHER_KEYWORDS.iter().any(|k| text.contains(k)) {
        return Route::Local(Intent::Weather);
    }

    Route::Delegate
}

/// Answer a time request, e.g. "Son las 09:05."
#[must_use]
pub fn describe_time<Tz: TimeZone>(now: &DateTime<Tz>, language: Language) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let clock = now.format("%H:%M");
    match language {
        Language::Es => format!("Son las {clock}."),
        Language::En => format!("It is {clock}."),
    }
}

/// Answers local intents
#[derive(Debug, Clone)]
pub struct IntentRouter {
    weather: WeatherClient,
}

impl IntentRouter {
    /// Create a router for the configured weather endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the weather HTTP client cannot be built
    pub fn new(config: &Config) -> crate::Result<Self> {
        Ok(Self {
            weather: WeatherClient::new(&config.weather_endpoint)?,
        })
    }

    /// Produce the spoken answer for a local intent
    ///
    /// Never fails: lookup problems become an apology string.
    pub async fn answer<Tz: TimeZone>(
        &self,
        intent: Intent,
        config: &Config,
        now: &DateTime<Tz>,
    ) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        match intent {
            Intent::Time => describe_time(now, config.language),
            Intent::Weather => self.weather.describe(config).await,
        }
    }
}
