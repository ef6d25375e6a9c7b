use serde::Serialize;

/// Field statistics for metrics collection (normalized units)
#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldStats {
    pub mean: [f32; 3],
    pub max: [f32; 3],
    /// Fraction of texels with any nonzero species channel
    pub coverage: f32,
}

/// Host-side image of one trail texture: RGBA8, row-major, top row first.
/// Channels r/g/b are the trails of species A/B/C; alpha is unused.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailField {
    pub size: [u32; 2],
    pub data: Vec<[u8; 4]>,
}

impl TrailField {
    /// Empty field (all species channels zero, alpha opaque)
    pub fn new(size: [u32; 2]) -> Self {
        Self::filled(size, [0, 0, 0, 255])
    }

    pub fn filled(size: [u32; 2], texel: [u8; 4]) -> Self {
        assert!(size[0] > 0 && size[1] > 0, "field dimensions must be positive, got {:?}", size);
        Self {
            size,
            data: vec![texel; size[0] as usize * size[1] as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.size[0]
    }

    pub fn height(&self) -> u32 {
        self.size[1]
    }

    pub fn get_index(&self, x: u32, y: u32) -> usize {
        (y * self.size[0] + x) as usize
    }

    pub fn get(&self, x: u32, y: u32) -> [u8; 4] {
        self.data[self.get_index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, texel: [u8; 4]) {
        let idx = self.get_index(x, y);
        self.data[idx] = texel;
    }

    /// Texel lookup with toroidal wrap on both axes
    pub fn get_wrapped(&self, x: i64, y: i64) -> [u8; 4] {
        let w = self.size[0] as i64;
        let h = self.size[1] as i64;
        self.get(x.rem_euclid(w) as u32, y.rem_euclid(h) as u32)
    }

    /// Normalized rgb of a texel
    pub fn sample(&self, x: i64, y: i64) -> [f32; 3] {
        let t = self.get_wrapped(x, y);
        [unorm(t[0]), unorm(t[1]), unorm(t[2])]
    }

    /// Texel containing a normalized position (wrapped)
    pub fn texel_at(&self, pos: [f32; 2]) -> (i64, i64) {
        let x = (pos[0] * self.size[0] as f32).floor() as i64;
        let y = (pos[1] * self.size[1] as f32).floor() as i64;
        (x.rem_euclid(self.size[0] as i64), y.rem_euclid(self.size[1] as i64))
    }

    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|t| t[0] == 0 && t[1] == 0 && t[2] == 0)
    }

    /// Tightly packed RGBA bytes, as expected by texture uploads
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn from_bytes(size: [u32; 2], bytes: &[u8]) -> Self {
        let expected = size[0] as usize * size[1] as usize * 4;
        if bytes.len() != expected {
            panic!("Invalid data length: expected {}, got {}", expected, bytes.len());
        }
        Self {
            size,
            data: bytemuck::cast_slice::<u8, [u8; 4]>(bytes).to_vec(),
        }
    }

    pub fn stats(&self) -> FieldStats {
        let mut sum = [0.0f64; 3];
        let mut max = [0u8; 3];
        let mut covered = 0usize;

        for t in &self.data {
            for c in 0..3 {
                sum[c] += t[c] as f64;
                max[c] = max[c].max(t[c]);
            }
            if t[0] > 0 || t[1] > 0 || t[2] > 0 {
                covered += 1;
            }
        }

        let n = self.data.len() as f64;
        FieldStats {
            mean: sum.map(|s| (s / n / 255.0) as f32),
            max: max.map(unorm),
            coverage: (covered as f64 / n) as f32,
        }
    }
}

/// 8-bit unorm to float
pub fn unorm(v: u8) -> f32 {
    v as f32 / 255.0
}

/// Float to 8-bit unorm with round-to-nearest, clamped
pub fn to_unorm(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_lookup_crosses_edges() {
        let mut f = TrailField::new([4, 3]);
        f.set(3, 2, [9, 0, 0, 255]);
        assert_eq!(f.get_wrapped(-1, -1)[0], 9);
        assert_eq!(f.get_wrapped(7, 5)[0], 9);
    }

    #[test]
    fn texel_at_wraps_positions() {
        let f = TrailField::new([8, 8]);
        assert_eq!(f.texel_at([0.0, 0.999]), (0, 7));
        assert_eq!(f.texel_at([1.0, -0.01]), (0, 7));
    }

    #[test]
    fn stats_of_blank_field() {
        let f = TrailField::new([16, 16]);
        let s = f.stats();
        assert!(f.is_blank());
        assert_eq!(s.mean, [0.0; 3]);
        assert_eq!(s.coverage, 0.0);
    }

    #[test]
    fn bytes_round_trip_layout() {
        let mut f = TrailField::new([2, 2]);
        f.set(1, 0, [1, 2, 3, 4]);
        let bytes = f.as_bytes();
        assert_eq!(&bytes[4..8], &[1, 2, 3, 4]);
        assert_eq!(TrailField::from_bytes([2, 2], bytes), f);
    }

    #[test]
    #[should_panic]
    fn zero_sized_field_is_rejected() {
        TrailField::new([0, 16]);
    }
}
