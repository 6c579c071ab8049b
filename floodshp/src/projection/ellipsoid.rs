//! Définitions des ellipsoïdes

/// Ellipsoïde de référence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Demi-grand axe (rayon équatorial) en mètres
    pub a: f64,

    /// Aplatissement
    pub f: f64,
}

impl Ellipsoid {
    /// GRS80, utilisé par la grille grecque (GGRS87)
    pub const GRS80: Ellipsoid = Ellipsoid {
        a: 6378137.0,
        f: 1.0 / 298.257222101,
    };

    /// Première excentricité au carré
    pub fn e2(&self) -> f64 {
        2.0 * self.f - self.f * self.f
    }
}
