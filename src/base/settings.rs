use crate::base::*;

impl Parse<Optimizer> for String {
    fn lparse(&self) -> Result<Optimizer> {
        match self.to_lowercase().as_str() {
            "amoeba" => Ok(Optimizer::Amoeba),
            "argmin" | "neldermead" => Ok(Optimizer::Argmin),
            x => Err(HivfitError::InvalidArgument(format!(
                "Unknown optimiser {}, please choose amoeba or argmin.",
                x
            ))),
        }
    }
}

impl Parse<NoiseModel> for String {
    fn lparse(&self) -> Result<NoiseModel> {
        match self.to_lowercase().as_str() {
            "gaussian" | "ou" => Ok(NoiseModel::Gaussian),
            "sqrt" => Ok(NoiseModel::Sqrt),
            x => Err(HivfitError::InvalidArgument(format!(
                "Unknown noise model {}, please choose gaussian or sqrt.",
                x
            ))),
        }
    }
}

impl Parse<PrecisionMode> for String {
    fn lparse(&self) -> Result<PrecisionMode> {
        match self.to_lowercase().as_str() {
            "inverse" => Ok(PrecisionMode::Inverse),
            "analytic" => Ok(PrecisionMode::Analytic),
            x => Err(HivfitError::InvalidArgument(format!(
                "Unknown precision mode {}, please choose inverse or analytic.",
                x
            ))),
        }
    }
}

impl Check for KlSettings {
    fn check(&self) -> Result<&Self> {
        if !(self.sigma >= 0.0 && self.sigma.is_finite()) {
            return Err(HivfitError::InvalidArgument(format!(
                "The sampling noise must be a non-negative number, got {}.",
                self.sigma
            )));
        }
        if self.precision == PrecisionMode::Analytic && self.noise != NoiseModel::Gaussian {
            return Err(HivfitError::InvalidArgument(
                "The analytic precision matrix is only available for Gaussian noise.".to_owned(),
            ));
        }
        if self.max_iters == 0 {
            return Err(HivfitError::InvalidArgument(
                "At least one optimiser iteration is required.".to_owned(),
            ));
        }
        Ok(self)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_settings() {
        let optimizer: Optimizer = "Argmin".to_owned().lparse().unwrap();
        assert_eq!(optimizer, Optimizer::Argmin);
        let noise: NoiseModel = "sqrt".to_owned().lparse().unwrap();
        assert_eq!(noise, NoiseModel::Sqrt);
        let precision: Result<PrecisionMode> = "cholesky".to_owned().lparse();
        assert!(precision.is_err());
        let mut settings = KlSettings {
            sigma: 0.0,
            weight_by_site_count: false,
            noise: NoiseModel::Gaussian,
            precision: PrecisionMode::Analytic,
            optimizer: Optimizer::Amoeba,
            max_iters: 10_000,
        };
        assert!(settings.check().is_ok());
        settings.noise = NoiseModel::Sqrt;
        assert!(settings.check().is_err());
        settings.precision = PrecisionMode::Inverse;
        assert!(settings.check().is_ok());
        settings.sigma = -0.01;
        assert!(settings.check().is_err());
    }
}
