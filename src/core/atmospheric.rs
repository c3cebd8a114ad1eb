//! Surface-reflectance correction with the 6S radiative transfer model.
//!
//! For every band the model is configured with the scene geometry, the
//! atmospheric constituents at the footprint centroid and the band's
//! spectral interval. Its irradiance, path radiance and transmissivity
//! outputs are injected into
//! `(pi*(L - Lp))/(tau2*(Edir+Edif))`.

use crate::config::AtmosphericParams;
use crate::core::dispatch::{CalcOptions, ExpressionDispatcher};
use crate::core::formula::{literal, CompiledExpression, FormulaCompiler};
use crate::core::registry::BandRegistry;
use crate::core::tool::ExternalTool;
use crate::io::{CalibrationTable, ImageMetadata};
use crate::types::{BoundingBox, GeoPoint, SpectralError, SpectralResult};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

/// Predefined 6S aerosol models
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AerosolProfile {
    NoAerosols,
    Continental,
    Maritime,
    Urban,
    #[default]
    Desert,
    BiomassBurning,
    Stratospheric,
}

impl AerosolProfile {
    /// 6S `iaer` code
    pub fn code(&self) -> u8 {
        match self {
            AerosolProfile::NoAerosols => 0,
            AerosolProfile::Continental => 1,
            AerosolProfile::Maritime => 2,
            AerosolProfile::Urban => 3,
            AerosolProfile::Desert => 5,
            AerosolProfile::BiomassBurning => 6,
            AerosolProfile::Stratospheric => 7,
        }
    }
}

/// Column water vapour, ozone and aerosol optical thickness at a point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtmosphericConstituents {
    /// g/cm²
    pub water_vapour: f64,
    /// cm-atm
    pub ozone: f64,
    /// Aerosol optical thickness at 550 nm
    pub aot550: f64,
}

/// Acquisition geometry in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub month: u32,
    pub day: u32,
    pub solar_zenith: f64,
    pub solar_azimuth: f64,
    pub view_zenith: f64,
    pub view_azimuth: f64,
}

impl Geometry {
    /// Geometry of a nadir view from the IMD angles
    pub fn from_metadata(metadata: &ImageMetadata) -> SpectralResult<Self> {
        let date = metadata.acquisition_time()?.date();
        let sun_elevation = metadata.group_f64("IMAGE_1", "meanSunEl")?;

        Ok(Self {
            month: date.month(),
            day: date.day(),
            solar_zenith: ((90.0 - sun_elevation) * 100.0).round() / 100.0,
            solar_azimuth: metadata.group_f64("IMAGE_1", "meanSunAz")?,
            view_zenith: 0.0,
            view_azimuth: metadata.group_f64("IMAGE_1", "meanSatAz")?,
        })
    }
}

/// Conditions shared by every band of a scene
#[derive(Debug, Clone, PartialEq)]
pub struct SceneConditions {
    pub geometry: Geometry,
    pub constituents: AtmosphericConstituents,
    pub aerosol_profile: AerosolProfile,
    pub target_altitude_km: f64,
    /// Sensor altitude in km; `None` puts the sensor at satellite level
    pub sensor_altitude_km: Option<f64>,
}

/// Everything one model run needs
#[derive(Debug, Clone, PartialEq)]
pub struct SixsConfig {
    pub scene: SceneConditions,
    /// Spectral interval in micrometers
    pub wavelength_low: f64,
    pub wavelength_high: f64,
}

impl SixsConfig {
    pub fn new(scene: SceneConditions, wavelength_low: f64, wavelength_high: f64) -> Self {
        Self {
            scene,
            wavelength_low,
            wavelength_high,
        }
    }

    /// 6S input card for a Lambertian target and no built-in correction
    pub fn input_card(&self) -> SpectralResult<String> {
        if !(0.25..=4.0).contains(&self.wavelength_low)
            || !(0.25..=4.0).contains(&self.wavelength_high)
            || self.wavelength_low >= self.wavelength_high
        {
            return Err(SpectralError::InvalidInput(format!(
                "Invalid 6S wavelength interval {}-{} µm",
                self.wavelength_low, self.wavelength_high
            )));
        }

        let mut card = String::new();
        self.write_card(&mut card)
            .map_err(|e| SpectralError::Processing(format!("Failed to format 6S input: {}", e)))?;
        Ok(card)
    }

    fn write_card(&self, card: &mut String) -> std::fmt::Result {
        let g = &self.scene.geometry;
        let c = &self.scene.constituents;

        writeln!(card, "0")?;
        writeln!(
            card,
            "{} {} {} {} {} {}",
            g.solar_zenith, g.solar_azimuth, g.view_zenith, g.view_azimuth, g.month, g.day
        )?;
        writeln!(card, "8")?;
        writeln!(card, "{} {}", c.water_vapour, c.ozone)?;
        writeln!(card, "{}", self.scene.aerosol_profile.code())?;
        writeln!(card, "0")?;
        writeln!(card, "{}", c.aot550)?;
        writeln!(card, "{}", -self.scene.target_altitude_km)?;
        match self.scene.sensor_altitude_km {
            None => writeln!(card, "-1000")?,
            Some(km) => {
                // aircraft level: altitude, then unknown water/ozone below and AOT below
                writeln!(card, "{}", -km)?;
                writeln!(card, "-1.0 -1.0")?;
                writeln!(card, "-1.0")?;
            }
        }
        writeln!(card, "0")?;
        writeln!(card, "{} {}", self.wavelength_low, self.wavelength_high)?;
        // homogeneous lambertian ground, constant reflectance
        writeln!(card, "0")?;
        writeln!(card, "0")?;
        writeln!(card, "0")?;
        writeln!(card, "0.3")?;
        writeln!(card, "-1")
    }
}

/// Outputs of one band's model run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SixsOutputs {
    pub direct_irradiance: f64,
    pub diffuse_irradiance: f64,
    pub path_radiance: f64,
    /// Upward gas absorption times upward scattering transmissivity
    pub transmissivity: f64,
}

impl SixsOutputs {
    /// Surface-reflectance formula over `band_key`
    pub fn formula(&self, band_key: &str) -> SpectralResult<String> {
        Ok(format!(
            "(pi*({} - {}))/({}*({}+{}))",
            band_key,
            literal(self.path_radiance)?,
            literal(self.transmissivity)?,
            literal(self.direct_irradiance)?,
            literal(self.diffuse_irradiance)?
        ))
    }
}

/// A radiative transfer model run per band
pub trait RadiativeTransferModel {
    fn run(&mut self, config: &SixsConfig) -> SpectralResult<SixsOutputs>;
}

/// The 6S executable, fed its input card on stdin
#[derive(Debug, Clone)]
pub struct SixsExecutable {
    program: String,
}

impl SixsExecutable {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl RadiativeTransferModel for SixsExecutable {
    fn run(&mut self, config: &SixsConfig) -> SpectralResult<SixsOutputs> {
        let card = config.input_card()?;
        log::debug!("6S input:\n{}", card);
        let output = ExternalTool::new(self.program.as_str()).run_with_input(&card)?;
        parse_sixs_output(&output.output)
    }
}

fn numbers(text: &str) -> Vec<f64> {
    text.split(|c: char| c.is_whitespace() || c == '*' || c == ':')
        .filter_map(|word| word.parse::<f64>().ok())
        .collect()
}

/// Extract the band outputs from a 6S report
pub fn parse_sixs_output(report: &str) -> SpectralResult<SixsOutputs> {
    let lines: Vec<&str> = report.lines().collect();

    let values_below = |label: &str| -> SpectralResult<Vec<f64>> {
        let idx = lines
            .iter()
            .position(|l| l.contains(label))
            .ok_or_else(|| SpectralError::Processing(format!("6S output has no '{}' line", label)))?;
        lines[idx + 1..]
            .iter()
            .map(|l| numbers(l))
            .find(|v| !v.is_empty())
            .ok_or_else(|| SpectralError::Processing(format!("6S output has no values below '{}'", label)))
    };

    let upward = |pattern: &str| -> SpectralResult<f64> {
        let re = Regex::new(pattern).map_err(|e| SpectralError::Processing(e.to_string()))?;
        let line = lines
            .iter()
            .find(|l| re.is_match(l))
            .ok_or_else(|| SpectralError::Processing(format!("6S output has no '{}' line", pattern)))?;
        let after_colon = line.split_once(':').map(|(_, v)| v).unwrap_or("");
        // downward, upward, total
        numbers(after_colon)
            .get(1)
            .copied()
            .ok_or_else(|| SpectralError::Processing(format!("6S line has no upward value: {}", line.trim())))
    };

    let irradiance = values_below("direct solar irr.")?;
    if irradiance.len() < 2 {
        return Err(SpectralError::Processing("6S irradiance line has fewer than two values".to_string()));
    }
    let radiance = values_below("atm. intrin. rad.")?;

    let outputs = SixsOutputs {
        direct_irradiance: irradiance[0],
        diffuse_irradiance: irradiance[1],
        path_radiance: radiance[0],
        transmissivity: upward(r"global gas\. trans\.")? * upward(r"total\s+sca\.")?,
    };
    log::debug!("6S outputs: {:?}", outputs);
    Ok(outputs)
}

/// Atmospheric state and terrain height at a location
pub trait AtmosphereSource {
    fn constituents(&self, point: GeoPoint, date: NaiveDate) -> SpectralResult<AtmosphericConstituents>;

    /// Mean terrain elevation in metres
    fn mean_elevation(&self, point: GeoPoint) -> SpectralResult<f64>;
}

/// Fixed values from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticAtmosphere {
    pub water_vapour: f64,
    pub ozone: f64,
    pub aot550: f64,
    pub elevation_m: f64,
}

impl Default for StaticAtmosphere {
    fn default() -> Self {
        Self {
            water_vapour: 1.5,
            ozone: 0.3,
            aot550: 0.2,
            elevation_m: 0.0,
        }
    }
}

impl AtmosphereSource for StaticAtmosphere {
    fn constituents(&self, _point: GeoPoint, _date: NaiveDate) -> SpectralResult<AtmosphericConstituents> {
        Ok(AtmosphericConstituents {
            water_vapour: self.water_vapour,
            ozone: self.ozone,
            aot550: self.aot550,
        })
    }

    fn mean_elevation(&self, _point: GeoPoint) -> SpectralResult<f64> {
        Ok(self.elevation_m)
    }
}

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    elevation: f64,
}

/// JSON atmosphere service.
///
/// `GET {url}/constituents?lon=..&lat=..&date=YYYY-MM-DD` returns
/// `{"water_vapour", "ozone", "aot550"}`; `GET {url}/elevation?lon=..&lat=..`
/// returns `{"elevation"}` in metres.
pub struct HttpAtmosphereService {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpAtmosphereService {
    pub fn new(base_url: &str, timeout_secs: u64) -> SpectralResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("multispec/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(base_url, client))
    }

    /// Service reached through an already configured client
    pub fn with_client(base_url: &str, client: reqwest::blocking::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, endpoint: &str, query: &[(&str, String)]) -> SpectralResult<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        log::info!("Requesting {} {:?}", url, query);
        let response = self.client.get(&url).query(query).send()?.error_for_status()?;
        Ok(response.json::<T>()?)
    }
}

impl AtmosphereSource for HttpAtmosphereService {
    fn constituents(&self, point: GeoPoint, date: NaiveDate) -> SpectralResult<AtmosphericConstituents> {
        self.get_json(
            "constituents",
            &[
                ("lon", point.lon.to_string()),
                ("lat", point.lat.to_string()),
                ("date", date.format("%Y-%m-%d").to_string()),
            ],
        )
    }

    fn mean_elevation(&self, point: GeoPoint) -> SpectralResult<f64> {
        let response: ElevationResponse = self.get_json(
            "elevation",
            &[("lon", point.lon.to_string()), ("lat", point.lat.to_string())],
        )?;
        Ok(response.elevation)
    }
}

/// Where atmospheric constituents come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AtmosphereSourceConfig {
    Static(StaticAtmosphere),
    Http { url: String, timeout_secs: u64 },
}

impl Default for AtmosphereSourceConfig {
    fn default() -> Self {
        AtmosphereSourceConfig::Static(StaticAtmosphere::default())
    }
}

impl AtmosphereSourceConfig {
    pub fn build(&self) -> SpectralResult<Box<dyn AtmosphereSource>> {
        Ok(match self {
            AtmosphereSourceConfig::Static(values) => Box::new(values.clone()),
            AtmosphereSourceConfig::Http { url, timeout_secs } => {
                Box::new(HttpAtmosphereService::new(url, *timeout_secs)?)
            }
        })
    }
}

/// Gather the scene conditions for an image
pub fn scene_conditions(
    metadata: &ImageMetadata,
    footprint: &BoundingBox,
    params: &AtmosphericParams,
    source: &dyn AtmosphereSource,
) -> SpectralResult<SceneConditions> {
    let geometry = Geometry::from_metadata(metadata)?;
    let date = metadata.acquisition_time()?.date();
    let centroid = footprint.centroid();

    let constituents = source.constituents(centroid, date)?;
    let elevation = source.mean_elevation(centroid)?;
    log::info!(
        "Atmosphere at ({:.4}, {:.4}) on {}: {:?}, elevation {:.1} m",
        centroid.lon,
        centroid.lat,
        date,
        constituents,
        elevation
    );

    Ok(SceneConditions {
        geometry,
        constituents,
        aerosol_profile: params.aerosol_profile,
        target_altitude_km: elevation / 1000.0,
        sensor_altitude_km: params.sensor_altitude_km,
    })
}

/// Runs the model band by band and builds the reflectance expressions
pub struct AtmosphericResolver<'a, M: RadiativeTransferModel + ?Sized> {
    model: &'a mut M,
    registry: &'a BandRegistry,
}

impl<'a, M: RadiativeTransferModel + ?Sized> AtmosphericResolver<'a, M> {
    /// `registry` must carry calibration; its band edges bound each model run
    pub fn new(model: &'a mut M, registry: &'a BandRegistry) -> Self {
        Self { model, registry }
    }

    /// Model outputs for one band; each run completes before the next starts
    pub fn outputs(&mut self, scene: &SceneConditions, band_key: &str) -> SpectralResult<SixsOutputs> {
        let calibration = self.registry.calibration(band_key)?;
        let config = SixsConfig::new(scene.clone(), calibration.spectral_low, calibration.spectral_high);
        log::info!(
            "Running 6S for band {} ({}-{} µm)",
            band_key,
            config.wavelength_low,
            config.wavelength_high
        );
        self.model.run(&config)
    }

    pub fn compile(&mut self, scene: &SceneConditions, source: &Path) -> SpectralResult<Vec<CompiledExpression>> {
        let registry = self.registry;
        FormulaCompiler::new(registry)
            .compile_each_band(source, |key| self.outputs(scene, key)?.formula(key))
    }
}

/// Convert radiance in `input` to surface reflectance in `output`
#[allow(clippy::too_many_arguments)]
pub fn atmospheric_correction<M, D>(
    input: &Path,
    output: &Path,
    metadata: &ImageMetadata,
    footprint: &BoundingBox,
    table: &CalibrationTable,
    params: &AtmosphericParams,
    model: &mut M,
    dispatcher: &mut D,
) -> SpectralResult<()>
where
    M: RadiativeTransferModel + ?Sized,
    D: ExpressionDispatcher + ?Sized,
{
    log::info!("Atmospheric correction: {}", input.display());

    let source = params.source.build()?;
    let scene = scene_conditions(metadata, footprint, params, source.as_ref())?;
    let registry = BandRegistry::from_metadata(metadata)?.with_calibration(table)?;
    let expressions = AtmosphericResolver::new(model, &registry).compile(&scene, input)?;
    dispatcher.dispatch(&expressions, output, &CalcOptions::default())?;

    log::info!("Atmospheric correction completed: {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader, Write as _};
    use std::net::TcpListener;
    use std::thread;

    const REPORT: &str = r#"
*******************************************************************************
*                        integrated values of  :                              *
*                        --------------------                                 *
*                                                                             *
*       apparent reflectance  0.1234567     appar. rad.(w/m2/sr/mic)   55.123 *
*                   total gaseous transmittance  0.987                        *
*                                                                             *
*******************************************************************************
*                         coupling aerosol -wv  :                             *
*                                                                             *
*******************************************************************************
*                                                                             *
*                         int. normalized  values  of  :                      *
*                                                                             *
*                     irr. at ground level (w/m2/mic)                         *
*                                                                             *
*   direct solar irr.    atm. diffuse irr.    environment  irr.               *
*             1405.567             223.934              24.412                *
*                                                                             *
*                    rad at satel. level (w/m2/sr/mic)                        *
*                                                                             *
*   atm. intrin. rad.    environment  rad.    target reflec. rad.             *
*             33.187                 4.107              58.226                *
*******************************************************************************
*                      integrated values of  :                                *
*                      --------------------                                   *
*                             downward        upward          total           *
* global gas. trans. :         0.98941       0.97905        0.96910           *
* water   "    "     :         0.99502       0.99313        0.98818           *
* total  sca.        :         0.80634       0.89089        0.71835           *
*******************************************************************************
"#;

    fn scene() -> SceneConditions {
        SceneConditions {
            geometry: Geometry {
                month: 5,
                day: 29,
                solar_zenith: 18.7,
                solar_azimuth: 123.4,
                view_zenith: 0.0,
                view_azimuth: 200.1,
            },
            constituents: AtmosphericConstituents {
                water_vapour: 2.1,
                ozone: 0.28,
                aot550: 0.15,
            },
            aerosol_profile: AerosolProfile::Desert,
            target_altitude_km: 0.35,
            sensor_altitude_km: None,
        }
    }

    /// Returns canned outputs and records the wavelengths it was run with
    struct RecordingModel {
        runs: Vec<(f64, f64)>,
    }

    impl RadiativeTransferModel for RecordingModel {
        fn run(&mut self, config: &SixsConfig) -> SpectralResult<SixsOutputs> {
            self.runs.push((config.wavelength_low, config.wavelength_high));
            Ok(SixsOutputs {
                direct_irradiance: 1000.0 + self.runs.len() as f64,
                diffuse_irradiance: 200.0,
                path_radiance: 30.0,
                transmissivity: 0.8,
            })
        }
    }

    #[test]
    fn test_parse_report() {
        let outputs = parse_sixs_output(REPORT).unwrap();
        assert_eq!(outputs.direct_irradiance, 1405.567);
        assert_eq!(outputs.diffuse_irradiance, 223.934);
        assert_eq!(outputs.path_radiance, 33.187);
        assert_relative_eq!(outputs.transmissivity, 0.97905 * 0.89089, epsilon = 1e-12);
    }

    #[test]
    fn test_truncated_report_is_error() {
        assert!(parse_sixs_output("*   direct solar irr.\n").is_err());
    }

    #[test]
    fn test_input_card() {
        let card = SixsConfig::new(scene(), 0.4, 0.45).input_card().unwrap();
        let lines: Vec<&str> = card.lines().collect();
        assert_eq!(lines[1], "18.7 123.4 0 200.1 5 29");
        assert_eq!(lines[3], "2.1 0.28");
        assert_eq!(lines[4], "5");
        assert_eq!(lines[7], "-0.35");
        assert_eq!(lines[8], "-1000");
        assert_eq!(lines[10], "0.4 0.45");

        assert!(SixsConfig::new(scene(), 0.45, 0.4).input_card().is_err());
    }

    #[test]
    fn test_input_card_aircraft_sensor() {
        let mut conditions = scene();
        conditions.sensor_altitude_km = Some(3.5);
        let card = SixsConfig::new(conditions, 0.63, 0.69).input_card().unwrap();
        let lines: Vec<&str> = card.lines().collect();

        assert_eq!(lines[7], "-0.35");
        assert_eq!(&lines[8..11], ["-3.5", "-1.0 -1.0", "-1.0"]);
        assert_eq!(lines[11], "0");
        assert_eq!(lines[12], "0.63 0.69");
        assert_eq!(lines.last(), Some(&"-1"));
        assert_eq!(lines.len(), 18);
    }

    /// Answers one HTTP request with `status` and `body`; yields the request line
    fn serve_once(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).unwrap();
                if header == "\r\n" || header.is_empty() {
                    break;
                }
            }
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .unwrap();
            request_line.trim_end().to_string()
        });
        (url, handle)
    }

    fn local_service(url: &str) -> HttpAtmosphereService {
        let client = reqwest::blocking::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        HttpAtmosphereService::with_client(url, client)
    }

    #[test]
    fn test_http_constituents() {
        let (url, server) = serve_once("200 OK", r#"{"water_vapour": 2.25, "ozone": 0.31, "aot550": 0.12}"#);
        let point = GeoPoint { lon: 67.2, lat: 37.1 };
        let date = NaiveDate::from_ymd_opt(2017, 5, 29).unwrap();

        let constituents = local_service(&url).constituents(point, date).unwrap();

        assert_eq!(
            constituents,
            AtmosphericConstituents {
                water_vapour: 2.25,
                ozone: 0.31,
                aot550: 0.12,
            }
        );
        assert_eq!(
            server.join().unwrap(),
            "GET /constituents?lon=67.2&lat=37.1&date=2017-05-29 HTTP/1.1"
        );
    }

    #[test]
    fn test_http_elevation() {
        let (url, server) = serve_once("200 OK", r#"{"elevation": 412.5}"#);
        let elevation = local_service(&url).mean_elevation(GeoPoint { lon: 67.2, lat: 37.1 }).unwrap();

        assert_eq!(elevation, 412.5);
        assert_eq!(server.join().unwrap(), "GET /elevation?lon=67.2&lat=37.1 HTTP/1.1");
    }

    #[test]
    fn test_http_server_error() {
        let (url, server) = serve_once("500 Internal Server Error", r#"{"error": "unavailable"}"#);
        let result = local_service(&url).mean_elevation(GeoPoint { lon: 0.0, lat: 0.0 });

        assert!(matches!(result, Err(SpectralError::Http(_))));
        server.join().unwrap();
    }

    #[test]
    fn test_geometry_from_metadata() {
        let imd = ImageMetadata::parse(
            "BEGIN_GROUP = IMAGE_1\n\tmeanSunAz = 123.4;\n\tmeanSunEl = 71.333;\n\tmeanSatAz = 200.1;\nEND_GROUP = IMAGE_1\n\
             BEGIN_GROUP = MAP_PROJECTED_PRODUCT\n\tearliestAcqTime = 2017-05-29T06:43:46.596700Z;\nEND_GROUP = MAP_PROJECTED_PRODUCT\nEND;\n",
        )
        .unwrap();
        let geometry = Geometry::from_metadata(&imd).unwrap();
        assert_eq!((geometry.month, geometry.day), (5, 29));
        assert_relative_eq!(geometry.solar_zenith, 18.67, epsilon = 1e-9);
        assert_eq!(geometry.view_zenith, 0.0);
        assert_eq!(geometry.view_azimuth, 200.1);
    }

    #[test]
    fn test_bands_run_in_order_with_their_intervals() {
        let table = CalibrationTable::worldview3().unwrap();
        let registry = BandRegistry::from_keys(&["C", "B", "N2"]).unwrap().with_calibration(&table).unwrap();
        let mut model = RecordingModel { runs: Vec::new() };

        let expressions = AtmosphericResolver::new(&mut model, &registry)
            .compile(&scene(), Path::new("rad.tif"))
            .unwrap();

        assert_eq!(model.runs, vec![(0.400, 0.450), (0.450, 0.510), (0.860, 1.040)]);
        assert_eq!(expressions[0].formula_text, "(pi*(A - 30))/(0.8*(1001+200))");
        assert_eq!(expressions[2].band_numbers, vec![('C', 3)]);
    }

    #[test]
    fn test_reflectance_value() {
        let outputs = SixsOutputs {
            direct_irradiance: 1405.567,
            diffuse_irradiance: 223.934,
            path_radiance: 33.187,
            transmissivity: 0.8,
        };
        let registry = BandRegistry::from_keys(&["R"]).unwrap();
        let formula = outputs.formula("R").unwrap();
        let expr = crate::core::formula::compile(&formula, &["R"], &registry, Path::new("rad.tif")).unwrap();

        let value = expr.evaluate(&HashMap::from([('A', 120.0)])).unwrap();
        let expected = std::f64::consts::PI * (120.0 - 33.187) / (0.8 * (1405.567 + 223.934));
        assert_relative_eq!(value, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_source_config_from_json() {
        let config: AtmosphereSourceConfig =
            serde_json::from_str(r#"{"kind": "http", "url": "http://localhost:8080", "timeout_secs": 30}"#).unwrap();
        assert!(matches!(config, AtmosphereSourceConfig::Http { ref url, .. } if url == "http://localhost:8080"));

        let config: AtmosphereSourceConfig =
            serde_json::from_str(r#"{"kind": "static", "water_vapour": 2.5}"#).unwrap();
        let source = config.build().unwrap();
        let point = GeoPoint { lon: 0.0, lat: 0.0 };
        let date = NaiveDate::from_ymd_opt(2017, 5, 29).unwrap();
        let constituents = source.constituents(point, date).unwrap();
        assert_eq!(constituents.water_vapour, 2.5);
        assert_eq!(constituents.ozone, 0.3);
    }
}
