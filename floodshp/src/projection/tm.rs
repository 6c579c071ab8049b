//! Mercator transverse inverse (série de Snyder)
//!
//! L'ordre des opérations est figé : ne pas réordonner les sommes.
//! Les puissances passent par `powf` (pow de la libm), pas par `powi`.

use super::{Geographic, TransverseMercator};

/// Convertit des coordonnées de grille en coordonnées géographiques
pub(super) fn inverse(params: &TransverseMercator, x: f64, y: f64) -> Geographic {
    let a = params.ellipsoid.a;
    let e2 = params.ellipsoid.e2();
    let k0 = params.scale_factor;
    let lon0 = params.central_meridian.to_radians();

    // Coordonnées réduites
    let x = x - params.false_easting;
    let y = y - params.false_northing;

    // Arc méridien
    let m = y / k0;

    let phi1 = footprint_latitude(m, a, e2);
    let (lat, lon) = latitude_longitude(x, phi1, lon0, k0, a, e2);

    Geographic::new(lat.to_degrees(), lon.to_degrees())
}

/// Latitude de l'empreinte, forme fermée (pas d'itération)
fn footprint_latitude(m: f64, a: f64, e2: f64) -> f64 {
    let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2 * e2 * e2 / 256.0));

    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
    let j1 = 3.0 * e1 / 2.0 - 27.0 * e1.powf(3.0) / 32.0;
    let j2 = 21.0 * e1.powf(2.0) / 16.0 - 55.0 * e1.powf(4.0) / 32.0;
    let j3 = 151.0 * e1.powf(3.0) / 96.0;
    let j4 = 1097.0 * e1.powf(4.0) / 512.0;

    mu + j1 * (2.0 * mu).sin() + j2 * (4.0 * mu).sin() + j3 * (6.0 * mu).sin() + j4 * (8.0 * mu).sin()
}

/// Latitude et longitude (radians) à partir de la latitude de l'empreinte
fn latitude_longitude(x: f64, phi1: f64, lon0: f64, k0: f64, a: f64, e2: f64) -> (f64, f64) {
    let c1 = e2 * phi1.cos().powf(2.0) / (1.0 - e2);
    let t1 = phi1.tan().powf(2.0);
    let r1 = a * (1.0 - e2) / (1.0 - e2 * phi1.sin().powf(2.0)).powf(1.5);
    let n1 = a / (1.0 - e2 * phi1.sin().powf(2.0)).sqrt();
    let d = x / (n1 * k0);

    let lat = latitude_terms(d, phi1, n1, r1, t1, c1, e2);
    let lon = longitude_terms(d, phi1, lon0, t1, c1, e2);
    (lat, lon)
}

fn latitude_terms(d: f64, phi1: f64, n1: f64, r1: f64, t1: f64, c1: f64, e2: f64) -> f64 {
    let q1 = n1 * phi1.tan() / r1;
    let q2 = d.powf(2.0) / 2.0;
    let q3 = (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1.powf(2.0) - 9.0 * e2) * d.powf(4.0) / 24.0;
    let q4 = (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1.powf(2.0) - 1.6 * e2 - 3.0 * c1.powf(2.0))
        * d.powf(6.0)
        / 720.0;

    phi1 - q1 * (q2 - q3 + q4)
}

fn longitude_terms(d: f64, phi1: f64, lon0: f64, t1: f64, c1: f64, e2: f64) -> f64 {
    let q5 = d;
    let q6 = (1.0 + 2.0 * t1 + c1) * d.powf(3.0) / 6.0;
    let q7 = (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1.powf(2.0) + 8.0 * e2 + 24.0 * t1.powf(2.0))
        * d.powf(5.0)
        / 120.0;

    lon0 + (q5 - q6 + q7) / phi1.cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRID: TransverseMercator = TransverseMercator::GREEK_GRID;

    fn assert_close(actual: Geographic, lat: f64, lon: f64, tol: f64) {
        assert!((actual.lat - lat).abs() < tol, "lat={} expected {}", actual.lat, lat);
        assert!((actual.lon - lon).abs() < tol, "lon={} expected {}", actual.lon, lon);
    }

    #[test]
    fn test_false_origin() {
        let geo = inverse(&GRID, 500000.0, 0.0);
        assert_close(geo, 0.0, 24.0, 1e-6);
    }

    #[test]
    fn test_reference_points() {
        // Valeurs de référence de la série en double précision
        assert_close(
            inverse(&GRID, 476000.0, 4205000.0),
            37.9923367043281,
            23.726671855988883,
            1e-9,
        );
        assert_close(
            inverse(&GRID, 350000.0, 4500000.0),
            40.637231070167246,
            22.22617515941506,
            1e-9,
        );
        assert_close(
            inverse(&GRID, 700000.0, 3900000.0),
            35.2231249413156,
            26.197541653719405,
            1e-9,
        );
        assert_close(
            inverse(&GRID, 200000.0, 4000000.0),
            36.098349197896965,
            20.66782282243578,
            1e-9,
        );
    }

    #[test]
    fn test_central_meridian_keeps_longitude() {
        let geo = inverse(&GRID, 500000.0, 9000000.0);
        assert_close(geo, 81.06088097413804, 24.0, 1e-9);
    }

    #[test]
    fn test_deterministic() {
        for &(x, y) in &[(476000.0, 4205000.0), (123456.78, 4012345.6), (812000.5, 4600000.25)] {
            let first = inverse(&GRID, x, y);
            let second = inverse(&GRID, x, y);
            assert_eq!(first.lat.to_bits(), second.lat.to_bits());
            assert_eq!(first.lon.to_bits(), second.lon.to_bits());
        }
    }

    #[test]
    fn test_west_of_domain() {
        // x = 0 : longitude hors de l'emprise grecque
        let geo = inverse(&GRID, 0.0, 4205000.0);
        assert_close(geo, 37.855285012503316, 18.31852911192782, 1e-9);
    }
}
