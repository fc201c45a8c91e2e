use std::fmt::Display;

/// Running summary of integer samples (leaf sizes, depths, ...).
#[derive(Clone, Debug, PartialEq)]
pub struct Stats {
    pub count: usize,
    pub min: usize,
    pub max: usize,
    pub avg: f32,
}

impl Stats {
    pub fn new_single(v: usize) -> Self {
        Stats {
            count: 1,
            min: v,
            max: v,
            avg: v as f32,
        }
    }

    pub fn add_sample(&mut self, value: usize) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.avg += (value as f32 - self.avg) / (self.count as f32);
    }

    /// Sum of all samples, reconstructed from the average
    pub fn total(&self) -> f32 {
        self.avg * self.count as f32
    }

    pub fn merge(&self, other: &Self) -> Self {
        let count = self.count + other.count;
        Stats {
            count,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            avg: if count > 0 {
                (self.total() + other.total()) / count as f32
            } else {
                0.0
            },
        }
    }

    /// Same samples, each increased by `offset`. Empty stats stay empty.
    pub fn shifted(&self, offset: usize) -> Self {
        if self.count == 0 {
            return self.clone();
        }
        Stats {
            count: self.count,
            min: self.min + offset,
            max: self.max + offset,
            avg: self.avg + offset as f32,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            count: 0,
            min: usize::MAX,
            max: 0,
            avg: 0.0,
        }
    }
}

impl FromIterator<usize> for Stats {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut ret = Stats::default();
        for value in iter {
            ret.add_sample(value);
        }
        ret
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            return write!(f, "no samples");
        }
        write!(
            f,
            "{}..={}, avg {:.2} ({} samples)",
            self.min, self.max, self.avg, self.count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    #[test]
    fn collected_samples() {
        let s: Stats = [4, 8, 6].into_iter().collect();
        assert!(s.count == 3);
        assert!(s.min == 4);
        assert!(s.max == 8);
        assert!(s.avg == 6.0);
        assert!(s.total() == 18.0);
    }

    #[test]
    fn merge_keeps_weighted_average() {
        let a = Stats::new_single(10);
        let b: Stats = [30, 50].into_iter().collect();
        let m = a.merge(&b);
        assert!(m.count == 3);
        assert!(m.min == 10);
        assert!(m.max == 50);
        assert!(m.avg == 30.0);
    }

    #[test]
    fn empty_is_neutral() {
        let s = Stats::new_single(5);
        assert!(Stats::default().merge(&s) == s);
        assert!(s.merge(&Stats::default()) == s);
        assert!(Stats::default().merge(&Stats::default()) == Stats::default());
    }

    #[test]
    fn shifted() {
        let s: Stats = [1, 3].into_iter().collect();
        assert!(s.shifted(2) == [3, 5].into_iter().collect());
        assert!(Stats::default().shifted(2) == Stats::default());
    }

    #[test]
    fn display_format() {
        assert!(format!("{}", Stats::new_single(42)) == "42..=42, avg 42.00 (1 samples)");
        assert!(format!("{}", Stats::default()) == "no samples");
    }
}
