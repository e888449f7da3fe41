use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Zip};

/// Adam with bias-corrected first and second moment estimates.
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    steps: i32,
    // (first moment, second moment) per parameter tensor
    moments: Vec<(ArrayD<f64>, ArrayD<f64>)>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            steps: 0,
            moments: Vec::new(),
        }
    }

    pub fn steps_taken(&self) -> i32 {
        self.steps
    }

    /// Apply one update. `params` and `grads` must be listed in the same
    /// order, and in the same order on every call.
    pub fn step(&mut self, params: Vec<ArrayViewMutD<'_, f64>>, grads: Vec<ArrayViewD<'_, f64>>) {
        assert_eq!(params.len(), grads.len(), "parameter/gradient count mismatch");
        if self.moments.is_empty() {
            self.moments = grads
                .iter()
                .map(|g| (ArrayD::zeros(g.raw_dim()), ArrayD::zeros(g.raw_dim())))
                .collect();
        }

        self.steps += 1;
        let bias1 = 1.0 - self.beta1.powi(self.steps);
        let bias2 = 1.0 - self.beta2.powi(self.steps);
        let step_size = self.learning_rate / bias1;
        let bias2_sqrt = bias2.sqrt();
        let (beta1, beta2, eps) = (self.beta1, self.beta2, self.eps);

        for ((param, grad), (m, v)) in params.into_iter().zip(grads).zip(self.moments.iter_mut()) {
            Zip::from(param)
                .and(&grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let denom = v.sqrt() / bias2_sqrt + eps;
                    *p -= step_size * *m / denom;
                });
        }
    }
}
