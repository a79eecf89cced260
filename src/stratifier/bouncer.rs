use super::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Consequence {
    None,
    Ban { invalid_percent: f64 },
}

/// Valid/invalid submit counters checked against the ban threshold.
#[derive(Debug, Clone)]
pub(crate) struct Bouncer {
    options: Option<BanningOptions>,
    valid: u32,
    invalid: u32,
}

impl Bouncer {
    pub(crate) fn new(options: Option<BanningOptions>) -> Self {
        Self {
            options: options.filter(|options| options.enabled),
            valid: 0,
            invalid: 0,
        }
    }

    pub(crate) fn record(&mut self, valid: bool) -> Consequence {
        let Some(options) = self.options else {
            return Consequence::None;
        };

        if valid {
            self.valid += 1;
        } else {
            self.invalid += 1;
        }

        let total = self.valid + self.invalid;

        if total < options.check_threshold {
            return Consequence::None;
        }

        let invalid_percent = f64::from(self.invalid) / f64::from(total) * 100.0;

        if invalid_percent < options.invalid_percent {
            self.valid = 0;
            self.invalid = 0;
            Consequence::None
        } else {
            Consequence::Ban { invalid_percent }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bouncer() -> Bouncer {
        Bouncer::new(Some(BanningOptions {
            check_threshold: 10,
            invalid_percent: 50.0,
            ..BanningOptions::default()
        }))
    }

    fn feed(bouncer: &mut Bouncer, valid: u32, invalid: u32) -> Vec<Consequence> {
        let mut consequences = Vec::new();

        for _ in 0..invalid {
            consequences.push(bouncer.record(false));
        }

        for _ in 0..valid {
            consequences.push(bouncer.record(true));
        }

        consequences
    }

    #[test]
    fn forty_percent_resets() {
        let mut bouncer = bouncer();

        assert!(
            feed(&mut bouncer, 6, 4)
                .iter()
                .all(|consequence| *consequence == Consequence::None)
        );
        assert_eq!((bouncer.valid, bouncer.invalid), (0, 0));
    }

    #[test]
    fn sixty_percent_bans() {
        let mut bouncer = bouncer();

        let consequences = feed(&mut bouncer, 4, 6);

        assert!(consequences[..9].iter().all(|c| *c == Consequence::None));
        assert_eq!(
            consequences[9],
            Consequence::Ban {
                invalid_percent: 60.0
            }
        );
    }

    #[test]
    fn disabled_never_counts() {
        let mut bouncer = Bouncer::new(Some(BanningOptions {
            enabled: false,
            check_threshold: 1,
            ..BanningOptions::default()
        }));

        assert_eq!(bouncer.record(false), Consequence::None);
        assert_eq!(bouncer.invalid, 0);

        let mut bouncer = Bouncer::new(None);
        assert_eq!(bouncer.record(false), Consequence::None);
    }
}
