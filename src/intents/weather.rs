//! Current weather lookup (`OpenWeatherMap`)

use std::time::Duration;

use serde::Deserialize;

use crate::Config;
use crate::config::Language;

/// Per-request timeout for weather lookups
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    main: WeatherMain,
    weather: Vec<WeatherCondition>,
}

#[derive(Debug, Deserialize)]
struct WeatherMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherCondition {
    description: String,
}

/// Fetches and describes current weather
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    endpoint: String,
}

impl WeatherClient {
    /// Create a client for `endpoint`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(endpoint: &str) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// Spoken weather report for the configured city
    ///
    /// Without an API key and a city no request is made.
    pub async fn describe(&self, config: &Config) -> String {
        let (Some(api_key), Some(city)) = (&config.weather_api_key, &config.city) else {
            return not_configured(config.language).to_string();
        };

        match self.fetch(api_key, city, config.language).await {
            Ok(report) => describe_report(&report, city, config.language)
                .unwrap_or_else(|| unavailable(config.language).to_string()),
            Err(e) => {
                tracing::warn!(error = %e, city, "weather lookup failed");
                unavailable(config.language).to_string()
            }
        }
    }

    async fn fetch(
        &self,
        api_key: &str,
        city: &str,
        language: Language,
    ) -> crate::Result<WeatherResponse> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", city),
                ("appid", api_key),
                ("units", "metric"),
                ("lang", language.code()),
            ])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

fn describe_report(report: &WeatherResponse, city: &str, language: Language) -> Option<String> {
    let description = &report.weather.first()?.description;
    let temp = report.main.temp;

    Some(match language {
        Language::Es => format!(
            "El tiempo en {city} es {description} con una temperatura de {temp} grados centígrados."
        ),
        Language::En => format!(
            "The weather in {city} is {description} with a temperature of {temp} degrees Celsius."
        ),
    })
}

const fn not_configured(language: Language) -> &'static str {
    match language {
        Language::Es => "Necesito la clave de la API y la ciudad configuradas para consultar el tiempo.",
        Language::En => "I need the API key and city configured to check the weather.",
    }
}

const fn unavailable(language: Language) -> &'static str {
    match language {
        Language::Es => "No he podido obtener la información del tiempo ahora mismo.",
        Language::En => "I couldn't get the weather information right now.",
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Answer one request with `status` and `body`, returning the endpoint URL
    async fn serve_once(status: &str, body: &str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            socket.read(&mut request).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });

        format!("http://{addr}/weather")
    }

    fn configured() -> Config {
        let mut config = Config::default();
        config.city = Some("Madrid".to_string());
        config.weather_api_key = Some("key".to_string());
        config
    }

    #[tokio::test]
    async fn test_missing_key_skips_request() {
        // Unroutable endpoint: any request would fail, not return this message
        let client = WeatherClient::new("http://127.0.0.1:9/weather").unwrap();
        let mut config = Config::default();
        config.city = Some("Madrid".to_string());

        assert_eq!(client.describe(&config).await, not_configured(Language::Es));

        config.city = None;
        config.weather_api_key = Some("key".to_string());
        config.language = Language::En;
        assert_eq!(client.describe(&config).await, not_configured(Language::En));
    }

    #[tokio::test]
    async fn test_transport_failure_is_apology() {
        let client = WeatherClient::new("http://127.0.0.1:9/weather").unwrap();
        let mut config = Config::default();
        config.city = Some("Madrid".to_string());
        config.weather_api_key = Some("key".to_string());

        assert_eq!(client.describe(&config).await, unavailable(Language::Es));
    }

    #[tokio::test]
    async fn test_rejected_key_is_apology() {
        let endpoint = serve_once(
            "401 Unauthorized",
            r#"{"cod": 401, "message": "Invalid API key."}"#,
        )
        .await;
        let client = WeatherClient::new(&endpoint).unwrap();

        assert_eq!(client.describe(&configured()).await, unavailable(Language::Es));
    }

    #[tokio::test]
    async fn test_malformed_body_is_apology() {
        let endpoint = serve_once("200 OK", r#"{"main": {"feels_like": 20.0}}"#).await;
        let client = WeatherClient::new(&endpoint).unwrap();

        let mut config = configured();
        config.language = Language::En;
        assert_eq!(client.describe(&config).await, unavailable(Language::En));
    }

    #[tokio::test]
    async fn test_successful_lookup() {
        let endpoint = serve_once(
            "200 OK",
            r#"{"main": {"temp": 18.0}, "weather": [{"description": "nubes dispersas"}]}"#,
        )
        .await;
        let client = WeatherClient::new(&endpoint).unwrap();

        assert_eq!(
            client.describe(&configured()).await,
            "El tiempo en Madrid es nubes dispersas con una temperatura de 18 grados centígrados."
        );
    }

    #[test]
    fn test_describe_report() {
        let body = r#"{"main": {"temp": 21.5, "humidity": 40}, "weather": [{"description": "cielo claro"}]}"#;
        let report: WeatherResponse = serde_json::from_str(body).unwrap();

        assert_eq!(
            describe_report(&report, "Madrid", Language::Es).unwrap(),
            "El tiempo en Madrid es cielo claro con una temperatura de 21.5 grados centígrados."
        );
    }

    #[test]
    fn test_report_without_conditions() {
        let report: WeatherResponse =
            serde_json::from_str(r#"{"main": {"temp": 3.0}, "weather": []}"#).unwrap();
        assert!(describe_report(&report, "Oslo", Language::En).is_none());
    }
}
