//! Weather specialist.
//!
//! Specific mode answers a dated question for one location: parameters are
//! extracted by the model and clamped to the forecast horizon, the location
//! is geocoded, hourly provider data is aggregated to a daily series, and
//! alerts/irrigation/work-window assessments are derived from thresholds.
//! Generic mode instead reasons from the farming season calendar and fetches
//! stage-appropriate ranges.

use crate::{profile_context, AgentFinding, AgentMode, AgentTag, Result, Specialist};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use kisanvani_llm::{extract_json, ChatModel, CompletionOptions};
use kisanvani_stores::FarmerProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Provider forecast horizon.
pub const FORECAST_HORIZON_DAYS: i64 = 16;

// Alert thresholds.
pub const HEAT_WAVE_MAX_C: f64 = 40.0;
pub const HEAVY_RAIN_SUM_MM: f64 = 50.0;
pub const DRY_SPELL_SUM_MM: f64 = 1.0;
pub const STRONG_WIND_GUST_KMH: f64 = 50.0;

// Field-work window limits.
pub const WORK_WINDOW_RAIN_MM: f64 = 1.0;
pub const WORK_WINDOW_WIND_KMH: f64 = 15.0;

// Irrigation rating bounds.
const IRRIGATION_LOW_RAIN_MM: f64 = 25.0;
const IRRIGATION_MODERATE_RAIN_MM: f64 = 10.0;
const IRRIGATION_HOT_TEMP_C: f64 = 35.0;

/// Geocoding fallback: New Delhi.
pub const DEFAULT_COORDINATES: (f64, f64) = (28.6139, 77.2090);
pub const DEFAULT_LOCATION: &str = "110001";

/// One aggregated forecast day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyWeather {
    pub date: NaiveDate,
    pub temp_mean: f64,
    pub temp_max: f64,
    pub temp_min: f64,
    pub humidity_mean: f64,
    pub rain_sum: f64,
    pub wind_speed_mean: f64,
    pub wind_gust_max: f64,
    pub soil_moisture_mean: f64,
}

/// Summary statistics over a daily series.
#[derive(Debug, Clone, Serialize)]
pub struct WeatherSummary {
    pub period_days: usize,
    pub temp_avg: f64,
    pub temp_max: f64,
    pub temp_min: f64,
    pub total_rainfall: f64,
    pub rainy_days: usize,
    pub avg_wind_speed: f64,
    pub max_wind_gust: f64,
}

pub fn build_summary(daily: &[DailyWeather]) -> WeatherSummary {
    let n = daily.len().max(1) as f64;
    WeatherSummary {
        period_days: daily.len(),
        temp_avg: daily.iter().map(|d| d.temp_mean).sum::<f64>() / n,
        temp_max: daily.iter().map(|d| d.temp_max).fold(f64::MIN, f64::max),
        temp_min: daily.iter().map(|d| d.temp_min).fold(f64::MAX, f64::min),
        total_rainfall: daily.iter().map(|d| d.rain_sum).sum(),
        rainy_days: daily.iter().filter(|d| d.rain_sum > 0.1).count(),
        avg_wind_speed: daily.iter().map(|d| d.wind_speed_mean).sum::<f64>() / n,
        max_wind_gust: daily.iter().map(|d| d.wind_gust_max).fold(f64::MIN, f64::max),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WeatherAlert {
    pub kind: &'static str,
    pub severity: &'static str,
    pub message: String,
}

/// Threshold alerts over a forecast summary.
pub fn detect_alerts(summary: &WeatherSummary) -> Vec<WeatherAlert> {
    let mut alerts = Vec::new();
    if summary.temp_max > HEAT_WAVE_MAX_C {
        alerts.push(WeatherAlert {
            kind: "heat_wave",
            severity: "high",
            message: format!(
                "Heat wave warning: temperature may reach {:.1} C. Increase irrigation and provide shade to crops.",
                summary.temp_max
            ),
        });
    }
    if summary.total_rainfall > HEAVY_RAIN_SUM_MM {
        alerts.push(WeatherAlert {
            kind: "heavy_rain",
            severity: "medium",
            message: format!(
                "Heavy rainfall expected: {:.1} mm over the forecast period. Check field drainage and delay field operations.",
                summary.total_rainfall
            ),
        });
    } else if summary.total_rainfall < DRY_SPELL_SUM_MM {
        alerts.push(WeatherAlert {
            kind: "dry_spell",
            severity: "medium",
            message: "Dry weather expected. Plan irrigation accordingly and monitor soil moisture."
                .to_string(),
        });
    }
    if summary.max_wind_gust > STRONG_WIND_GUST_KMH {
        alerts.push(WeatherAlert {
            kind: "strong_winds",
            severity: "high",
            message: format!(
                "Strong winds expected: gusts up to {:.0} km/h. Secure equipment and avoid spraying operations.",
                summary.max_wind_gust
            ),
        });
    }
    alerts
}

/// Irrigation-need rating from expected rainfall, adjusted for heat.
pub fn assess_irrigation(summary: &WeatherSummary) -> (&'static str, String) {
    let mut need = if summary.total_rainfall > IRRIGATION_LOW_RAIN_MM {
        "low"
    } else if summary.total_rainfall > IRRIGATION_MODERATE_RAIN_MM {
        "moderate"
    } else {
        "high"
    };
    if summary.temp_avg > IRRIGATION_HOT_TEMP_C {
        need = "high";
    }
    let detail = format!(
        "Irrigation need is {need} based on {:.1} mm expected rainfall and {:.1} C average temperature.",
        summary.total_rainfall, summary.temp_avg
    );
    (need, detail)
}

/// Days safe for spraying, machinery and harvest: little rain, light wind.
pub fn field_work_windows(daily: &[DailyWeather]) -> Vec<NaiveDate> {
    daily
        .iter()
        .filter(|d| d.rain_sum < WORK_WINDOW_RAIN_MM && d.wind_speed_mean < WORK_WINDOW_WIND_KMH)
        .map(|d| d.date)
        .take(5)
        .collect()
}

fn assess_risks(summary: &WeatherSummary) -> (Vec<&'static str>, &'static str) {
    let mut risks = Vec::new();
    if summary.temp_max > 38.0 {
        risks.push("heat_stress");
    }
    if summary.total_rainfall < 5.0 {
        risks.push("drought_stress");
    }
    if summary.total_rainfall > 75.0 {
        risks.push("waterlogging");
    }
    if summary.max_wind_gust > 45.0 {
        risks.push("wind_damage");
    }
    let level = if risks.len() > 2 {
        "high"
    } else if !risks.is_empty() {
        "medium"
    } else {
        "low"
    };
    (risks, level)
}

// --- seasonal calendar -----------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Kharif,
    Rabi,
    Zaid,
}

impl Season {
    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Kharif => "kharif",
            Season::Rabi => "rabi",
            Season::Zaid => "zaid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Sowing,
    Growing,
    Harvest,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Sowing => "sowing",
            Stage::Growing => "growing",
            Stage::Harvest => "harvest",
        }
    }
}

#[derive(Debug, Clone)]
struct SeasonInfo {
    season: Season,
    start_month: u32,
    end_month: u32,
    sowing: (u32, u32),
    harvest: (u32, u32),
}

/// The three-season calendar; rabi wraps across the year boundary.
#[derive(Debug, Clone)]
pub struct SeasonCalendar {
    seasons: Vec<SeasonInfo>,
}

impl Default for SeasonCalendar {
    fn default() -> Self {
        Self {
            seasons: vec![
                SeasonInfo {
                    season: Season::Kharif,
                    start_month: 6,
                    end_month: 10,
                    sowing: (6, 7),
                    harvest: (9, 10),
                },
                SeasonInfo {
                    season: Season::Rabi,
                    start_month: 11,
                    end_month: 4,
                    sowing: (11, 12),
                    harvest: (3, 4),
                },
                SeasonInfo {
                    season: Season::Zaid,
                    start_month: 4,
                    end_month: 6,
                    sowing: (4, 5),
                    harvest: (6, 6),
                },
            ],
        }
    }
}

fn month_in_range(month: u32, start: u32, end: u32) -> bool {
    if start <= end {
        (start..=end).contains(&month)
    } else {
        month >= start || month <= end
    }
}

impl SeasonCalendar {
    /// Current season and within-season stage for a calendar month.
    pub fn resolve(&self, month: u32) -> (Season, Stage) {
        let info = self
            .seasons
            .iter()
            .find(|s| month_in_range(month, s.start_month, s.end_month))
            .unwrap_or(&self.seasons[0]);

        let stage = if month_in_range(month, info.sowing.0, info.sowing.1) {
            Stage::Sowing
        } else if month_in_range(month, info.harvest.0, info.harvest.1) {
            Stage::Harvest
        } else {
            Stage::Growing
        };
        (info.season, stage)
    }
}

/// Stage-appropriate forecast ranges for the generic pipeline.
pub fn seasonal_ranges(stage: Stage, today: NaiveDate) -> Vec<(&'static str, NaiveDate, NaiveDate)> {
    let horizon = |days: i64| today + Duration::days(days.min(FORECAST_HORIZON_DAYS));
    match stage {
        Stage::Sowing => vec![
            ("immediate", today, horizon(7)),
            ("sowing_planning", today, horizon(16)),
        ],
        Stage::Harvest => vec![
            ("immediate", today, horizon(7)),
            ("harvest_window", today, horizon(14)),
        ],
        Stage::Growing => vec![
            ("immediate", today, horizon(7)),
            ("irrigation_planning", today, horizon(14)),
        ],
    }
}

pub fn stage_activities(stage: Stage) -> &'static [&'static str] {
    match stage {
        Stage::Sowing => &[
            "Prepare seedbed",
            "Check seed quality",
            "Plan irrigation schedule",
            "Apply basal fertilizers",
            "Monitor weather for the sowing window",
        ],
        Stage::Growing => &[
            "Monitor crop growth",
            "Manage irrigation",
            "Apply fertilizers as needed",
            "Scout for pests and diseases",
            "Weed management",
        ],
        Stage::Harvest => &[
            "Monitor crop maturity",
            "Plan harvest timing",
            "Arrange transportation",
            "Check market prices",
            "Prepare storage facilities",
        ],
    }
}

pub fn weather_considerations(stage: Stage) -> &'static [&'static str] {
    match stage {
        Stage::Sowing => &[
            "Avoid sowing before heavy rains",
            "Ensure adequate soil moisture",
            "Check for favourable temperature conditions",
        ],
        Stage::Growing => &[
            "Monitor rainfall for irrigation planning",
            "Watch for pest-favourable weather conditions",
            "Protect crops from extreme weather",
        ],
        Stage::Harvest => &[
            "Ensure dry weather for harvest",
            "Avoid harvest during rains",
            "Plan around storm predictions",
        ],
    }
}

// --- parameter extraction --------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherParams {
    pub location: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Clamp extracted dates: start not in the past, end inside the forecast
/// horizon and strictly after start.
pub fn validate_params(mut params: WeatherParams, today: NaiveDate) -> WeatherParams {
    let max_end = today + Duration::days(FORECAST_HORIZON_DAYS);
    if params.start < today {
        params.start = today;
    }
    if params.end > max_end {
        params.end = max_end;
    }
    if params.end <= params.start {
        params.end = params.start + Duration::days(7);
    }
    params
}

pub fn default_params(profile: &FarmerProfile, today: NaiveDate) -> WeatherParams {
    let location = profile
        .pincode
        .clone()
        .unwrap_or_else(|| DEFAULT_LOCATION.to_string());
    WeatherParams {
        location,
        start: today,
        end: today + Duration::days(7),
    }
}

// --- external clients ------------------------------------------------------

/// Daily forecast source.
#[async_trait::async_trait]
pub trait ForecastApi: Send + Sync {
    async fn daily_forecast(
        &self,
        latitude: f64,
        longitude: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyWeather>>;
}

/// Location to coordinates.
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, location: &str) -> Result<Option<(f64, f64)>>;
}

/// Open-Meteo style forecast endpoint: hourly series aggregated to daily.
pub struct OpenMeteoClient {
    http: reqwest::Client,
    endpoint: String,
}

impl OpenMeteoClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: "https://api.open-meteo.com/v1/forecast".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for OpenMeteoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct HourlyResponse {
    hourly: HourlySeries,
}

#[derive(Debug, Deserialize, Default)]
pub struct HourlySeries {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<f64>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<f64>,
    #[serde(default)]
    pub rain: Vec<f64>,
    #[serde(default)]
    pub wind_speed_120m: Vec<f64>,
    #[serde(default)]
    pub wind_gusts_10m: Vec<f64>,
    #[serde(default)]
    pub soil_moisture_3_to_9cm: Vec<f64>,
}

/// Collapse an hourly series into per-day mean/max/min/sum aggregates.
pub fn aggregate_hourly(series: &HourlySeries) -> Vec<DailyWeather> {
    struct Acc {
        temps: Vec<f64>,
        humidity: Vec<f64>,
        rain: f64,
        wind: Vec<f64>,
        gust_max: f64,
        moisture: Vec<f64>,
    }

    let mut days: BTreeMap<NaiveDate, Acc> = BTreeMap::new();
    for (i, stamp) in series.time.iter().enumerate() {
        let Some(date) = stamp
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            continue;
        };
        let acc = days.entry(date).or_insert_with(|| Acc {
            temps: Vec::new(),
            humidity: Vec::new(),
            rain: 0.0,
            wind: Vec::new(),
            gust_max: f64::MIN,
            moisture: Vec::new(),
        });
        if let Some(v) = series.temperature_2m.get(i) {
            acc.temps.push(*v);
        }
        if let Some(v) = series.relative_humidity_2m.get(i) {
            acc.humidity.push(*v);
        }
        if let Some(v) = series.rain.get(i) {
            acc.rain += v;
        }
        if let Some(v) = series.wind_speed_120m.get(i) {
            acc.wind.push(*v);
        }
        if let Some(v) = series.wind_gusts_10m.get(i) {
            acc.gust_max = acc.gust_max.max(*v);
        }
        if let Some(v) = series.soil_moisture_3_to_9cm.get(i) {
            acc.moisture.push(*v);
        }
    }

    fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    days.into_iter()
        .map(|(date, acc)| DailyWeather {
            date,
            temp_mean: mean(&acc.temps),
            temp_max: acc.temps.iter().copied().fold(f64::MIN, f64::max),
            temp_min: acc.temps.iter().copied().fold(f64::MAX, f64::min),
            humidity_mean: mean(&acc.humidity),
            rain_sum: acc.rain,
            wind_speed_mean: mean(&acc.wind),
            wind_gust_max: if acc.gust_max == f64::MIN { 0.0 } else { acc.gust_max },
            soil_moisture_mean: mean(&acc.moisture),
        })
        .collect()
}

#[async_trait::async_trait]
impl ForecastApi for OpenMeteoClient {
    async fn daily_forecast(
        &self,
        latitude: f64,
        longitude: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyWeather>> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                (
                    "hourly",
                    "temperature_2m,relative_humidity_2m,rain,wind_speed_120m,wind_gusts_10m,soil_moisture_3_to_9cm"
                        .to_string(),
                ),
                ("start_date", start.format("%Y-%m-%d").to_string()),
                ("end_date", end.format("%Y-%m-%d").to_string()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(crate::AgentError::BadStatus(status.as_u16()));
        }
        let parsed: HourlyResponse = response.json().await?;
        Ok(aggregate_hourly(&parsed.hourly))
    }
}

/// Nominatim-style geocoder.
pub struct NominatimClient {
    http: reqwest::Client,
    endpoint: String,
}

impl NominatimClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: "https://nominatim.openstreetmap.org/search".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for NominatimClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    lat: String,
    lon: String,
}

#[async_trait::async_trait]
impl Geocoder for NominatimClient {
    async fn geocode(&self, location: &str) -> Result<Option<(f64, f64)>> {
        // A bare 6-digit postal code geocodes better with the country added.
        let query = if location.len() == 6 && location.chars().all(|c| c.is_ascii_digit()) {
            format!("{location}, India")
        } else {
            location.to_string()
        };
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("q", query.as_str()), ("format", "json"), ("limit", "1")])
            .header("User-Agent", "kisanvani-weather-agent")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(crate::AgentError::BadStatus(status.as_u16()));
        }
        let hits: Vec<GeocodeHit> = response.json().await?;
        Ok(hits.first().and_then(|hit| {
            match (hit.lat.parse::<f64>(), hit.lon.parse::<f64>()) {
                (Ok(lat), Ok(lon)) => Some((lat, lon)),
                _ => None,
            }
        }))
    }
}

// --- the specialist --------------------------------------------------------

pub struct WeatherSpecialist {
    llm: Arc<dyn ChatModel>,
    forecast: Arc<dyn ForecastApi>,
    geocoder: Arc<dyn Geocoder>,
    calendar: SeasonCalendar,
}

impl WeatherSpecialist {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        forecast: Arc<dyn ForecastApi>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        Self {
            llm,
            forecast,
            geocoder,
            calendar: SeasonCalendar::default(),
        }
    }

    async fn extract_parameters(&self, query: &str, profile: &FarmerProfile) -> WeatherParams {
        let today = Utc::now().date_naive();
        let prompt = format!(
            r#"Extract weather lookup parameters from this farmer query.

CURRENT DATE: {today}

{context}

FARMER QUERY: "{query}"

Rules:
- If no location is mentioned, use the farmer profile pincode.
- If no timeframe is mentioned, default to the next 7 days.
- start_date must not be before the current date; the forecast reaches at most {FORECAST_HORIZON_DAYS} days ahead.

Respond ONLY with JSON:
{{"location": "pincode or place name", "start_date": "YYYY-MM-DD", "end_date": "YYYY-MM-DD"}}"#,
            context = profile_context(profile),
        );

        let extracted = match self.llm.complete(&prompt, CompletionOptions::with_temperature(0.1)).await {
            Ok(reply) => extract_json(&reply).and_then(|value| {
                let location = value["location"].as_str()?.to_string();
                let start = NaiveDate::parse_from_str(value["start_date"].as_str()?, "%Y-%m-%d").ok()?;
                let end = NaiveDate::parse_from_str(value["end_date"].as_str()?, "%Y-%m-%d").ok()?;
                Some(WeatherParams {
                    location,
                    start,
                    end,
                })
            }),
            Err(e) => {
                tracing::warn!(error = %e, "weather parameter extraction failed");
                None
            }
        };

        match extracted {
            Some(params) => validate_params(params, today),
            None => default_params(profile, today),
        }
    }

    async fn resolve_coordinates(&self, location: &str) -> (f64, f64) {
        match self.geocoder.geocode(location).await {
            Ok(Some(coords)) => coords,
            Ok(None) => {
                tracing::warn!(location, "location not found, using default coordinates");
                DEFAULT_COORDINATES
            }
            Err(e) => {
                tracing::warn!(location, error = %e, "geocoding failed, using default coordinates");
                DEFAULT_COORDINATES
            }
        }
    }

    async fn analysis_prose(
        &self,
        query: &str,
        summary: &WeatherSummary,
        irrigation_detail: &str,
        alerts: &[WeatherAlert],
    ) -> String {
        let prompt = format!(
            r#"You are an agricultural meteorologist advising an Indian farmer.

FARMER QUERY: "{query}"

FORECAST SUMMARY: {period} days, {tmin:.1}-{tmax:.1} C (avg {tavg:.1} C), {rain:.1} mm rain over {rainy} days, wind avg {wind:.1} km/h (gusts to {gust:.0} km/h).

Give practical guidance: answer the question directly, then cover irrigation, field-operation timing and any weather risks. Keep it short and actionable."#,
            period = summary.period_days,
            tmin = summary.temp_min,
            tmax = summary.temp_max,
            tavg = summary.temp_avg,
            rain = summary.total_rainfall,
            rainy = summary.rainy_days,
            wind = summary.avg_wind_speed,
            gust = summary.max_wind_gust,
        );
        match self.llm.complete(&prompt, CompletionOptions::with_temperature(0.3)).await {
            Ok(prose) => prose.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "weather analysis fell back to summary prose");
                let mut prose = format!(
                    "Expect {:.1} mm of rain over the next {} days with temperatures between {:.0} and {:.0} C. {}",
                    summary.total_rainfall,
                    summary.period_days,
                    summary.temp_min,
                    summary.temp_max,
                    irrigation_detail
                );
                for alert in alerts {
                    prose.push(' ');
                    prose.push_str(&alert.message);
                }
                prose
            }
        }
    }

    async fn process_specific(&self, query: &str, profile: &FarmerProfile) -> AgentFinding {
        let params = self.extract_parameters(query, profile).await;
        let (lat, lon) = self.resolve_coordinates(&params.location).await;

        let daily = match self
            .forecast
            .daily_forecast(lat, lon, params.start, params.end)
            .await
        {
            Ok(daily) if !daily.is_empty() => daily,
            Ok(_) => return AgentFinding::empty(AgentTag::Weather, "No forecast data for the requested period."),
            Err(e) => return AgentFinding::failed(AgentTag::Weather, e),
        };

        let summary = build_summary(&daily);
        let alerts = detect_alerts(&summary);
        let (irrigation_need, irrigation_detail) = assess_irrigation(&summary);
        let windows = field_work_windows(&daily);
        let (risks, risk_level) = assess_risks(&summary);
        let prose = self
            .analysis_prose(query, &summary, &irrigation_detail, &alerts)
            .await;

        let structured = serde_json::json!({
            "location": params.location,
            "coordinates": {"latitude": lat, "longitude": lon},
            "period": {"start": params.start, "end": params.end},
            "daily": daily,
            "summary": summary,
            "alerts": alerts,
            "irrigation": {"need_level": irrigation_need, "detail": irrigation_detail},
            "field_work_windows": &windows,
            "risks": risks,
        });

        AgentFinding::ok(AgentTag::Weather, structured, prose)
            .with_insight("irrigation_need", serde_json::json!(irrigation_need))
            .with_insight("risk_level", serde_json::json!(risk_level))
            .with_insight(
                "field_work_days",
                serde_json::json!(windows.iter().map(|d| d.to_string()).collect::<Vec<_>>()),
            )
    }

    async fn process_generic(&self, query: &str, profile: &FarmerProfile) -> AgentFinding {
        let today = Utc::now().date_naive();
        let (season, stage) = self.calendar.resolve(today.month());
        let location = profile
            .pincode
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());
        let (lat, lon) = self.resolve_coordinates(&location).await;

        let mut periods = serde_json::Map::new();
        let mut combined: Vec<DailyWeather> = Vec::new();
        for (label, start, end) in seasonal_ranges(stage, today) {
            match self.forecast.daily_forecast(lat, lon, start, end).await {
                Ok(daily) => {
                    periods.insert(
                        label.to_string(),
                        serde_json::json!({
                            "period": {"start": start, "end": end},
                            "summary": build_summary(&daily),
                        }),
                    );
                    for day in daily {
                        if !combined.iter().any(|d| d.date == day.date) {
                            combined.push(day);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(label, error = %e, "seasonal forecast fetch failed");
                }
            }
        }

        if combined.is_empty() {
            return AgentFinding::failed(
                AgentTag::Weather,
                "no forecast data available for seasonal guidance",
            );
        }
        combined.sort_by_key(|d| d.date);

        let summary = build_summary(&combined);
        let (irrigation_need, irrigation_detail) = assess_irrigation(&summary);
        let spray_days: Vec<String> = combined
            .iter()
            .filter(|d| d.rain_sum < WORK_WINDOW_RAIN_MM)
            .take(3)
            .map(|d| d.date.to_string())
            .collect();

        let prompt = format!(
            r#"You are an agricultural consultant giving seasonal guidance.

FARMER QUERY: "{query}"
SEASON: {season} ({stage} stage)
{context}
FORECAST: {rain:.1} mm rain over {days} days, average {tavg:.1} C.

Cover: stage-appropriate activities for the {season} season, an irrigation calendar, optimal timing for operations, and risk mitigation. Keep it practical."#,
            season = season.as_str(),
            stage = stage.as_str(),
            context = profile_context(profile),
            rain = summary.total_rainfall,
            days = summary.period_days,
            tavg = summary.temp_avg,
        );
        let prose = match self.llm.complete(&prompt, CompletionOptions::with_temperature(0.3)).await {
            Ok(prose) => prose.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "seasonal analysis fell back to calendar prose");
                format!(
                    "It is the {} stage of the {} season. Key activities: {}. {}",
                    stage.as_str(),
                    season.as_str(),
                    stage_activities(stage).join(", "),
                    irrigation_detail
                )
            }
        };

        let structured = serde_json::json!({
            "seasonal_context": {"season": season.as_str(), "stage": stage.as_str(), "month": today.month()},
            "periods": periods,
            "summary": summary,
            "seasonal_calendar": {
                "season": season.as_str(),
                "current_stage": stage.as_str(),
                "stage_activities": stage_activities(stage),
                "weather_considerations": weather_considerations(stage),
                "optimal_spray_days": spray_days,
            },
            "irrigation": {"need_level": irrigation_need, "detail": irrigation_detail},
        });

        AgentFinding::ok(AgentTag::Weather, structured, prose)
            .with_insight("season", serde_json::json!(season.as_str()))
            .with_insight("farming_stage", serde_json::json!(stage.as_str()))
            .with_insight("irrigation_need", serde_json::json!(irrigation_need))
    }
}

#[async_trait::async_trait]
impl Specialist for WeatherSpecialist {
    fn tag(&self) -> AgentTag {
        AgentTag::Weather
    }

    async fn process(&self, query: &str, profile: &FarmerProfile, mode: AgentMode) -> AgentFinding {
        tracing::info!(mode = ?mode, "weather specialist processing");
        match mode {
            AgentMode::Specific => self.process_specific(query, profile).await,
            AgentMode::Generic => self.process_generic(query, profile).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FindingStatus;
    use kisanvani_llm::testing::ScriptedModel;

    fn day(date: &str, temp: f64, rain: f64, wind: f64, gust: f64) -> DailyWeather {
        DailyWeather {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            temp_mean: temp,
            temp_max: temp + 5.0,
            temp_min: temp - 5.0,
            humidity_mean: 60.0,
            rain_sum: rain,
            wind_speed_mean: wind,
            wind_gust_max: gust,
            soil_moisture_mean: 0.2,
        }
    }

    struct FixedForecast {
        days: Vec<DailyWeather>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl ForecastApi for FixedForecast {
        async fn daily_forecast(
            &self,
            _lat: f64,
            _lon: f64,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<DailyWeather>> {
            if self.fail {
                Err(crate::AgentError::BadStatus(500))
            } else {
                Ok(self.days.clone())
            }
        }
    }

    struct NullGeocoder;

    #[async_trait::async_trait]
    impl Geocoder for NullGeocoder {
        async fn geocode(&self, _location: &str) -> Result<Option<(f64, f64)>> {
            Ok(None)
        }
    }

    #[test]
    fn test_alert_thresholds() {
        let hot_dry = build_summary(&[day("2026-08-01", 38.0, 0.0, 10.0, 20.0)]);
        let alerts = detect_alerts(&hot_dry);
        let kinds: Vec<&str> = alerts.iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&"heat_wave"));
        assert!(kinds.contains(&"dry_spell"));

        let stormy = build_summary(&[
            day("2026-08-01", 28.0, 40.0, 20.0, 60.0),
            day("2026-08-02", 28.0, 30.0, 20.0, 55.0),
        ]);
        let kinds: Vec<&str> = detect_alerts(&stormy).iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&"heavy_rain"));
        assert!(kinds.contains(&"strong_winds"));
        assert!(!kinds.contains(&"dry_spell"));
    }

    #[test]
    fn test_irrigation_rating() {
        let wet = build_summary(&[day("2026-08-01", 25.0, 30.0, 5.0, 10.0)]);
        assert_eq!(assess_irrigation(&wet).0, "low");

        let mild = build_summary(&[day("2026-08-01", 25.0, 15.0, 5.0, 10.0)]);
        assert_eq!(assess_irrigation(&mild).0, "moderate");

        let dry = build_summary(&[day("2026-08-01", 25.0, 2.0, 5.0, 10.0)]);
        assert_eq!(assess_irrigation(&dry).0, "high");

        // Heat overrides rainfall.
        let hot_wet = build_summary(&[day("2026-08-01", 36.0, 30.0, 5.0, 10.0)]);
        assert_eq!(assess_irrigation(&hot_wet).0, "high");
    }

    #[test]
    fn test_field_work_windows() {
        let days = vec![
            day("2026-08-01", 25.0, 0.0, 10.0, 15.0), // good
            day("2026-08-02", 25.0, 5.0, 10.0, 15.0), // rainy
            day("2026-08-03", 25.0, 0.5, 20.0, 30.0), // windy
            day("2026-08-04", 25.0, 0.0, 5.0, 10.0),  // good
        ];
        let windows = field_work_windows(&days);
        assert_eq!(
            windows,
            vec![
                NaiveDate::parse_from_str("2026-08-01", "%Y-%m-%d").unwrap(),
                NaiveDate::parse_from_str("2026-08-04", "%Y-%m-%d").unwrap(),
            ]
        );
    }

    #[test]
    fn test_season_resolution_including_wrap() {
        let calendar = SeasonCalendar::default();
        assert_eq!(calendar.resolve(7), (Season::Kharif, Stage::Sowing));
        assert_eq!(calendar.resolve(8), (Season::Kharif, Stage::Growing));
        assert_eq!(calendar.resolve(10), (Season::Kharif, Stage::Harvest));
        // Rabi wraps the year boundary.
        assert_eq!(calendar.resolve(12), (Season::Rabi, Stage::Sowing));
        assert_eq!(calendar.resolve(1), (Season::Rabi, Stage::Growing));
        assert_eq!(calendar.resolve(3), (Season::Rabi, Stage::Harvest));
        assert_eq!(calendar.resolve(5), (Season::Zaid, Stage::Sowing));
    }

    #[test]
    fn test_date_validation_clamps() {
        let today = NaiveDate::parse_from_str("2026-08-01", "%Y-%m-%d").unwrap();
        let params = validate_params(
            WeatherParams {
                location: "452001".to_string(),
                start: NaiveDate::parse_from_str("2026-07-20", "%Y-%m-%d").unwrap(),
                end: NaiveDate::parse_from_str("2026-09-30", "%Y-%m-%d").unwrap(),
            },
            today,
        );
        assert_eq!(params.start, today);
        assert_eq!(params.end, today + Duration::days(FORECAST_HORIZON_DAYS));

        // Inverted range becomes start + 7 days.
        let params = validate_params(
            WeatherParams {
                location: "452001".to_string(),
                start: today,
                end: today,
            },
            today,
        );
        assert_eq!(params.end, today + Duration::days(7));
    }

    #[test]
    fn test_hourly_aggregation() {
        let series = HourlySeries {
            time: vec![
                "2026-08-01T00:00".to_string(),
                "2026-08-01T01:00".to_string(),
                "2026-08-02T00:00".to_string(),
            ],
            temperature_2m: vec![20.0, 30.0, 26.0],
            relative_humidity_2m: vec![50.0, 70.0, 60.0],
            rain: vec![1.0, 2.0, 0.0],
            wind_speed_120m: vec![10.0, 20.0, 12.0],
            wind_gusts_10m: vec![15.0, 40.0, 18.0],
            soil_moisture_3_to_9cm: vec![0.1, 0.3, 0.2],
        };
        let daily = aggregate_hourly(&series);
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].temp_mean, 25.0);
        assert_eq!(daily[0].temp_max, 30.0);
        assert_eq!(daily[0].rain_sum, 3.0);
        assert_eq!(daily[0].wind_gust_max, 40.0);
        assert_eq!(daily[1].rain_sum, 0.0);
    }

    #[tokio::test]
    async fn test_specific_mode_with_failed_llm_still_answers() {
        let specialist = WeatherSpecialist::new(
            Arc::new(ScriptedModel::failing()),
            Arc::new(FixedForecast {
                days: vec![day("2026-08-01", 26.0, 12.0, 8.0, 20.0)],
                fail: false,
            }),
            Arc::new(NullGeocoder),
        );
        let finding = specialist
            .process("Should I irrigate this week?", &FarmerProfile::default(), AgentMode::Specific)
            .await;
        assert_eq!(finding.status, FindingStatus::Ok);
        assert!(finding.insights.contains_key("irrigation_need"));
        assert!(!finding.prose.is_empty());
    }

    #[tokio::test]
    async fn test_forecast_failure_yields_failed_finding() {
        let specialist = WeatherSpecialist::new(
            Arc::new(ScriptedModel::failing()),
            Arc::new(FixedForecast {
                days: Vec::new(),
                fail: true,
            }),
            Arc::new(NullGeocoder),
        );
        let finding = specialist
            .process("rain?", &FarmerProfile::default(), AgentMode::Specific)
            .await;
        assert_eq!(finding.status, FindingStatus::Failed);
    }
}
