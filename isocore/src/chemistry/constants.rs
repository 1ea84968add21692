pub const MASS_PROTON: f64 = 1.007276466621;
pub const MASS_NEUTRON: f64 = 1.00866491595;
pub const MASS_ELECTRON: f64 = 0.00054857990946;
pub const MASS_WATER: f64 = 18.0105646863;
