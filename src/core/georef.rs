//! Ship-relative to geographic sounding positions
//!
//! Beam footprints arrive as along/across offsets from the transmit array.
//! Each ping's offsets are rotated by the ping heading into grid east/north,
//! added to the interpolated ship position projected into the ship's UTM
//! zone, and converted back to latitude/longitude for the record. Depths are
//! shifted from the parsed transducer reference onto the configured vertical
//! reference at the same time, so downstream stages see one convention.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::core::geodesy::{utm_for_position, utm_to_geodetic};
use crate::core::navigation::NavigationTrack;
use crate::types::{
    DepthReference, GeoreferencedSounding, InstallParams, RuntimeParams, SoundingPing,
};

/// Georeferencing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeorefConfig {
    /// Vertical reference for output depths
    pub depth_reference: DepthReference,
}

impl Default for GeorefConfig {
    fn default() -> Self {
        GeorefConfig {
            depth_reference: DepthReference::Waterline,
        }
    }
}

/// Turns decoded pings into georeferenced soundings
pub struct SoundingGeoreferencer {
    config: GeorefConfig,
}

impl SoundingGeoreferencer {
    pub fn new(config: GeorefConfig) -> Self {
        SoundingGeoreferencer { config }
    }

    /// Georeferencer with the default configuration
    pub fn standard() -> Self {
        SoundingGeoreferencer::new(GeorefConfig::default())
    }

    /// Vertical shift from the parsed transducer reference to the configured
    /// one, for a given ping
    ///
    /// Parsed depths are below the transmit transducer. The transducer depth
    /// below the waterline comes with every ping; the waterline offset WLZ
    /// comes from the installation record and is zero (with a warning) when
    /// that record never carried it.
    fn depth_shift(&self, ping: &SoundingPing, install: &InstallParams) -> f64 {
        match self.config.depth_reference {
            DepthReference::TxArray => 0.0,
            DepthReference::Waterline => ping.tx_depth_m,
            DepthReference::Origin => {
                let wlz = match install.waterline_z_m {
                    Some(wlz) => wlz,
                    None => {
                        warn!("no WLZ in installation record, origin reference degrades to waterline");
                        0.0
                    }
                };
                ping.tx_depth_m + wlz
            }
        }
    }

    /// Georeference every valid beam of one ping
    ///
    /// Invalid detections are skipped here and only ever show up in counts.
    /// `runtime` is the newest runtime record at or before the ping, used to
    /// stamp the operating mode onto each sounding.
    pub fn georeference_ping(
        &self,
        ping: &SoundingPing,
        track: &NavigationTrack,
        install: &InstallParams,
        runtime: Option<&RuntimeParams>,
        source: &Arc<str>,
    ) -> Vec<GeoreferencedSounding> {
        let (lat, lon) = track.interpolate(ping.header.timestamp);
        let (ship_e, ship_n, zone) = utm_for_position(lat, lon);
        let heading = ping.heading_deg.to_radians();
        let shift = self.depth_shift(ping, install);
        let (ping_mode, pulse_form, swath_mode) = match runtime {
            Some(r) => (r.ping_mode(), r.pulse_form(), r.swath_mode()),
            None => (0, 0, 0),
        };

        ping.beams
            .iter()
            .filter(|beam| beam.is_valid())
            .map(|beam| {
                let radius = beam.along_m.hypot(beam.across_m);
                let azimuth_ship = beam.along_m.atan2(beam.across_m);
                let azimuth_geo = azimuth_ship - heading;
                let easting = ship_e + radius * azimuth_geo.cos();
                let northing = ship_n + radius * azimuth_geo.sin();
                let (latitude, longitude) = utm_to_geodetic(easting, northing, zone);
                GeoreferencedSounding {
                    time: ping.header.timestamp,
                    latitude,
                    longitude,
                    easting,
                    northing,
                    utm_zone: zone,
                    depth_m: beam.depth_m + shift,
                    beam_angle_deg: beam.beam_angle_deg(),
                    backscatter_db: beam.backscatter_db,
                    ping_mode,
                    pulse_form,
                    swath_mode,
                    source: Arc::clone(source),
                }
            })
            .collect()
    }
}

/// Newest runtime record at or before a time, from a time-sorted slice
pub fn runtime_at<'a>(
    runtimes: &'a [RuntimeParams],
    time: DateTime<Utc>,
) -> Option<&'a RuntimeParams> {
    let idx = runtimes.partition_point(|r| r.header.timestamp <= time);
    if idx == 0 {
        None
    } else {
        Some(&runtimes[idx - 1])
    }
}
