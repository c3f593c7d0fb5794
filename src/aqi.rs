//! Air Quality Index derivation from particulate concentrations.
//!
//! Each pollutant maps independently through EPA-style concentration
//! breakpoints via piecewise-linear interpolation; the reported AQI is
//! the worse of the two pollutant indices. Pure math — no hardware, no
//! state — so it is fully testable on the host.

/// Index ceiling of the top breakpoint segment; concentrations above the
/// table clamp here.
pub const AQI_MAX: u16 = 500;

/// One row of a breakpoint table: a concentration range mapped linearly
/// onto an index range.
struct Breakpoint {
    conc_lo: f32,
    conc_hi: f32,
    index_lo: u16,
    index_hi: u16,
}

/// PM2.5 breakpoints (µg/m³, 24-hour, EPA 2012 table).
const PM25_BREAKPOINTS: [Breakpoint; 7] = [
    Breakpoint { conc_lo: 0.0, conc_hi: 12.0, index_lo: 0, index_hi: 50 },
    Breakpoint { conc_lo: 12.1, conc_hi: 35.4, index_lo: 51, index_hi: 100 },
    Breakpoint { conc_lo: 35.5, conc_hi: 55.4, index_lo: 101, index_hi: 150 },
    Breakpoint { conc_lo: 55.5, conc_hi: 150.4, index_lo: 151, index_hi: 200 },
    Breakpoint { conc_lo: 150.5, conc_hi: 250.4, index_lo: 201, index_hi: 300 },
    Breakpoint { conc_lo: 250.5, conc_hi: 350.4, index_lo: 301, index_hi: 400 },
    Breakpoint { conc_lo: 350.5, conc_hi: 500.4, index_lo: 401, index_hi: 500 },
];

/// PM10 breakpoints (µg/m³, 24-hour).
const PM10_BREAKPOINTS: [Breakpoint; 7] = [
    Breakpoint { conc_lo: 0.0, conc_hi: 54.0, index_lo: 0, index_hi: 50 },
    Breakpoint { conc_lo: 55.0, conc_hi: 154.0, index_lo: 51, index_hi: 100 },
    Breakpoint { conc_lo: 155.0, conc_hi: 254.0, index_lo: 101, index_hi: 150 },
    Breakpoint { conc_lo: 255.0, conc_hi: 354.0, index_lo: 151, index_hi: 200 },
    Breakpoint { conc_lo: 355.0, conc_hi: 424.0, index_lo: 201, index_hi: 300 },
    Breakpoint { conc_lo: 425.0, conc_hi: 504.0, index_lo: 301, index_hi: 400 },
    Breakpoint { conc_lo: 505.0, conc_hi: 604.0, index_lo: 401, index_hi: 500 },
];

/// Map one pollutant concentration through its breakpoint table.
/// Returns `None` for non-finite input; negative readings clamp to 0.
fn pollutant_index(conc: f32, table: &[Breakpoint; 7]) -> Option<u16> {
    if !conc.is_finite() {
        return None;
    }
    let conc = conc.max(0.0);

    for bp in table {
        // Table gaps (e.g. 12.0 -> 12.1) fall into the higher segment.
        if conc <= bp.conc_hi {
            let span = bp.conc_hi - bp.conc_lo;
            let index = f32::from(bp.index_hi - bp.index_lo) / span * (conc - bp.conc_lo).max(0.0)
                + f32::from(bp.index_lo);
            return Some(index.round() as u16);
        }
    }

    // Above the top segment: clamp to its index ceiling.
    Some(AQI_MAX)
}

/// AQI from PM2.5 and PM10 concentrations (µg/m³).
///
/// The worst pollutant governs. If only one input is finite, that
/// pollutant's index is returned directly; if neither is, the result is
/// `None` (invalid).
pub fn aqi(pm25: f32, pm10: f32) -> Option<u16> {
    let i25 = pollutant_index(pm25, &PM25_BREAKPOINTS);
    let i10 = pollutant_index(pm10, &PM10_BREAKPOINTS);

    match (i25, i10) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}
