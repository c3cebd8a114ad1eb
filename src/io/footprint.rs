use crate::types::{BoundingBox, SpectralError, SpectralResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const CORNER_TAGS: [&str; 4] = ["NWLAT", "NWLONG", "SELAT", "SELONG"];

/// Read the product footprint from a `README.XML` file
pub fn read_footprint<P: AsRef<Path>>(path: P) -> SpectralResult<BoundingBox> {
    log::info!("Reading product footprint: {}", path.as_ref().display());
    let content = fs::read_to_string(&path)?;
    parse_footprint(&content)
}

/// Build the bounding box from the NW/SE corner tags (EPSG:4326)
pub fn parse_footprint(xml_content: &str) -> SpectralResult<BoundingBox> {
    let values = corner_values(xml_content)?;
    let corner = |tag: &str| -> SpectralResult<f64> {
        let raw = values
            .get(tag)
            .ok_or_else(|| SpectralError::Metadata(format!("Missing <{}> in README.XML", tag)))?;
        raw.parse::<f64>()
            .map_err(|e| SpectralError::Metadata(format!("Invalid <{}> value '{}': {}", tag, raw, e)))
    };

    let nw_lon = corner("NWLONG")?;
    let nw_lat = corner("NWLAT")?;
    let se_lon = corner("SELONG")?;
    let se_lat = corner("SELAT")?;

    let bbox = BoundingBox {
        min_lon: nw_lon.min(se_lon),
        max_lon: nw_lon.max(se_lon),
        min_lat: nw_lat.min(se_lat),
        max_lat: nw_lat.max(se_lat),
    };
    log::debug!("Footprint: {:?}", bbox);
    Ok(bbox)
}

/// Text of the first element named like each corner tag, at any depth.
///
/// Namespace prefixes are ignored; CDATA sections count as text and
/// comments are skipped.
fn corner_values(xml_content: &str) -> SpectralResult<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let xml_error = |position: usize, e: quick_xml::Error| {
        SpectralError::Metadata(format!("README.XML parse error at byte {}: {}", position, e))
    };

    let mut values: HashMap<String, String> = HashMap::new();
    let mut current: Option<String> = None;
    loop {
        let event = reader
            .read_event()
            .map_err(|e| xml_error(reader.buffer_position(), e))?;
        match event {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                current = (CORNER_TAGS.contains(&name.as_str()) && !values.contains_key(&name)).then_some(name);
            }
            Event::Text(text) => {
                if let Some(tag) = &current {
                    let text = text.unescape().map_err(|e| xml_error(reader.buffer_position(), e))?;
                    values.entry(tag.clone()).or_default().push_str(text.trim());
                }
            }
            Event::CData(data) => {
                if let Some(tag) = &current {
                    let bytes = data.into_inner();
                    values
                        .entry(tag.clone())
                        .or_default()
                        .push_str(String::from_utf8_lossy(&bytes).trim());
                }
            }
            Event::End(_) => current = None,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(values)
}
