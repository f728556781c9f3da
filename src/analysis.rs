//! Learned unrolled solvers for the TV-regularized analysis problem
//! `argmin_u 0.5 * ||x - u A||^2 + lbda * ||u D||_1`.
//!
//! Five variants share one chassis and differ in the iteration a layer
//! unrolls:
//!
//! * [`lista_tv`](AnalysisNetwork::lista_tv): learned gradient step followed
//!   by a nested LISTA network acting as the TV prox in the synthesis
//!   domain;
//! * [`lpgd_taut_string`](AnalysisNetwork::lpgd_taut_string): learned
//!   gradient step followed by the exact TV prox;
//! * [`coupled_condat_vu`](AnalysisNetwork::coupled_condat_vu): primal-dual
//!   iteration with a learned coupling matrix;
//! * [`step_condat_vu`](AnalysisNetwork::step_condat_vu): primal-dual
//!   iteration with a learned dual step size;
//! * [`step_sub_grad_tv`](AnalysisNetwork::step_sub_grad_tv): subgradient
//!   descent with a learned step size.
//!
//! Forward passes are generic over the scalar type, so the same layer code
//! produces plain evaluations and tape-recorded ones during training.

use log::{info, warn};

use crate::api::grad_with_value;
use crate::config::{Device, NetSolverType, NetworkConfig, ProxLearn};
use crate::error::LpgdError;
use crate::init::{init_vuz, TvOperators};
use crate::linalg::Mat;
use crate::loss::analysis_loss;
use crate::network::UnrolledNet;
use crate::params::{ParamLayout, ParameterGroup, ParameterStore};
use crate::prox::{prox_tv_rows, pseudo_soft_threshold};
use crate::reverse::Reverse;
use crate::scalar::Scalar;
use crate::synthesis::ListaLASSO;
use crate::train::{gradient_descent, DescentParams, FitResult, Objective};

#[derive(Clone, Copy, Debug)]
enum TvVariant {
    ListaTv,
    TautString,
    CoupledCondatVu,
    StepCondatVu,
    SubGradTv,
}

#[derive(Clone, Debug)]
enum ProxNets {
    Shared(ListaLASSO),
    PerLayer(Vec<ListaLASSO>),
}

/// Primal iterate, with the dual iterate alongside for the primal-dual
/// variants.
#[derive(Clone, Debug)]
pub struct LayerState<T> {
    pub u: Mat<T>,
    pub v: Option<Mat<T>>,
}

/// Lifted operators and resolved parameters for one forward pass.
struct ForwardCtx<'a, T> {
    params: &'a ParameterStore<T>,
    x: Mat<T>,
    a: Mat<T>,
    a_t: Mat<T>,
    d: Mat<T>,
    d_t: Mat<T>,
    lbda_t: T,
}

/// Sign with `sign(0) = 0`, the subgradient chosen at the kink.
fn sign0<T: Scalar<Float = f64>>(z: T) -> T {
    if z.value() == 0.0 {
        T::zero()
    } else {
        z.signum()
    }
}

/// An unrolled solver for the analysis formulation.
#[derive(Clone, Debug)]
pub struct AnalysisNetwork {
    base: UnrolledNet,
    ops: TvOperators,
    variant: TvVariant,
    use_moreau: bool,
    prox: Option<ProxNets>,
}

impl AnalysisNetwork {
    /// LPGD with a nested LISTA network as the learned TV prox.
    pub fn lista_tv(a: Mat<f64>, cfg: &NetworkConfig) -> Result<Self, LpgdError> {
        let learn_th = cfg.learn_th.unwrap_or(true);
        let use_moreau = cfg.use_moreau.unwrap_or(false);
        let learn_prox = cfg.learn_prox;
        let name = cfg
            .name
            .clone()
            .unwrap_or_else(|| format!("LPGD - Lista[{}-{}]", learn_prox, cfg.n_inner_layers));
        let ops = TvOperators::new(a)?;
        let mut base = UnrolledNet::new(cfg, learn_th, name);

        // A top-level `prox` override feeds the shared inner network; the
        // per-layer mode nests prox overrides inside each layer group
        // instead.
        let mut overrides = cfg.initial_parameters.clone();
        let shared_prox_overrides = match learn_prox {
            ProxLearn::None | ProxLearn::Global => overrides
                .as_mut()
                .and_then(|s| s.remove_group("prox"))
                .map(|g| g.to_store()),
            ProxLearn::PerLayer => None,
        };
        let prox = build_prox_nets(&ops, cfg, learn_prox, shared_prox_overrides, base.layer_keys().len())?;

        let affine = gradient_step_group(&ops, learn_th);
        match &prox {
            ProxNets::PerLayer(nets) => {
                for (idx, key) in base.layer_keys().into_iter().enumerate() {
                    let mut group = affine.clone();
                    group.insert_subgroup("prox", nets[idx].parameters().to_group());
                    base.store.insert_group(key, group);
                }
            }
            ProxNets::Shared(net) => {
                for key in base.layer_keys() {
                    base.store.insert_group(key, affine.clone());
                }
                if learn_prox == ProxLearn::Global {
                    base.store.insert_group("prox", net.parameters().to_group());
                    base.force_learn_groups.push("prox".to_string());
                }
            }
        }
        if let Some(overrides) = &overrides {
            base.apply_initial_parameters(overrides)?;
        }

        Ok(AnalysisNetwork {
            base,
            ops,
            variant: TvVariant::ListaTv,
            use_moreau,
            prox: Some(prox),
        })
    }

    /// LPGD with the exact TV prox, computed by the taut-string algorithm.
    pub fn lpgd_taut_string(a: Mat<f64>, cfg: &NetworkConfig) -> Result<Self, LpgdError> {
        let learn_th = cfg.learn_th.unwrap_or(false);
        let use_moreau = cfg.use_moreau.unwrap_or(true);
        let name = cfg
            .name
            .clone()
            .unwrap_or_else(|| "LPGD - Taut-string".to_string());
        let ops = TvOperators::new(a)?;
        let mut base = UnrolledNet::new(cfg, learn_th, name);
        install_layer_groups(&mut base, gradient_step_group(&ops, learn_th));
        if let Some(overrides) = &cfg.initial_parameters {
            base.apply_initial_parameters(overrides)?;
        }
        Ok(AnalysisNetwork {
            base,
            ops,
            variant: TvVariant::TautString,
            use_moreau,
            prox: None,
        })
    }

    /// Condat-Vu iteration with a learned dual coupling matrix.
    pub fn coupled_condat_vu(a: Mat<f64>, cfg: &NetworkConfig) -> Result<Self, LpgdError> {
        let learn_th = cfg.learn_th.unwrap_or(true);
        let use_moreau = cfg.use_moreau.unwrap_or(false);
        let name = cfg
            .name
            .clone()
            .unwrap_or_else(|| "learned-Condat-Vu-coupled".to_string());
        let ops = TvOperators::new(a)?;
        let mut base = UnrolledNet::new(cfg, learn_th, name);
        let mut group = ParameterGroup::new();
        group.insert("W_coupled", ops.d().clone());
        if learn_th {
            group.insert_scalar("threshold", 1.0);
        }
        install_layer_groups(&mut base, group);
        if let Some(overrides) = &cfg.initial_parameters {
            base.apply_initial_parameters(overrides)?;
        }
        Ok(AnalysisNetwork {
            base,
            ops,
            variant: TvVariant::CoupledCondatVu,
            use_moreau,
            prox: None,
        })
    }

    /// Condat-Vu iteration with a learned dual step size, kept inside
    /// `[0.5, 2.0]` by clamping on every forward pass.
    pub fn step_condat_vu(a: Mat<f64>, cfg: &NetworkConfig) -> Result<Self, LpgdError> {
        let use_moreau = cfg.use_moreau.unwrap_or(false);
        let name = cfg
            .name
            .clone()
            .unwrap_or_else(|| "learned-Condat-Vu-step".to_string());
        if cfg.learn_th == Some(true) {
            warn!("'{name}' has no threshold parameter; learn_th is ignored");
        }
        let ops = TvOperators::new(a)?;
        let mut base = UnrolledNet::new(cfg, false, name);
        let mut group = ParameterGroup::new();
        group.insert_scalar("sigma", 0.5);
        install_layer_groups(&mut base, group);
        if let Some(overrides) = &cfg.initial_parameters {
            base.apply_initial_parameters(overrides)?;
        }
        Ok(AnalysisNetwork {
            base,
            ops,
            variant: TvVariant::StepCondatVu,
            use_moreau,
            prox: None,
        })
    }

    /// Subgradient descent on the analysis objective with a learned step
    /// size.
    pub fn step_sub_grad_tv(a: Mat<f64>, cfg: &NetworkConfig) -> Result<Self, LpgdError> {
        let use_moreau = cfg.use_moreau.unwrap_or(false);
        let name = cfg
            .name
            .clone()
            .unwrap_or_else(|| "learned-TV Sub Gradient".to_string());
        if cfg.learn_th.unwrap_or(true) {
            warn!("'{name}' has no threshold parameter; learn_th is ignored");
        }
        let ops = TvOperators::new(a)?;
        let mut base = UnrolledNet::new(cfg, false, name);
        let mut group = ParameterGroup::new();
        group.insert_scalar("step_size", 1e-10);
        install_layer_groups(&mut base, group);
        if let Some(overrides) = &cfg.initial_parameters {
            base.apply_initial_parameters(overrides)?;
        }
        Ok(AnalysisNetwork {
            base,
            ops,
            variant: TvVariant::SubGradTv,
            use_moreau,
            prox: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn n_layers(&self) -> usize {
        self.base.n_layers
    }

    pub fn device(&self) -> Device {
        self.base.device
    }

    pub fn parameters(&self) -> &ParameterStore<f64> {
        &self.base.store
    }

    pub fn operators(&self) -> &TvOperators {
        &self.ops
    }

    fn carries_dual(&self) -> bool {
        matches!(
            self.variant,
            TvVariant::CoupledCondatVu | TvVariant::StepCondatVu
        )
    }

    fn check_features(&self, x: &Mat<f64>) -> Result<(), LpgdError> {
        if x.cols() != self.ops.n_dim() {
            return Err(LpgdError::FeatureMismatch {
                expected: self.ops.n_dim(),
                got: x.cols(),
            });
        }
        Ok(())
    }

    /// State fed to the first layer.
    pub fn init_state(&self, x: &Mat<f64>, lbda: f64) -> Result<LayerState<f64>, LpgdError> {
        self.check_features(x)?;
        let (v0, u0, _z0) = init_vuz(&self.ops, x, lbda, None);
        Ok(LayerState {
            u: u0,
            v: self.carries_dual().then_some(v0),
        })
    }

    /// Apply layer `layer_id` to a state.
    pub fn step(
        &self,
        state: &LayerState<f64>,
        x: &Mat<f64>,
        lbda: f64,
        layer_id: usize,
    ) -> Result<LayerState<f64>, LpgdError> {
        self.base.check_output_layer(Some(layer_id + 1))?;
        self.check_features(x)?;
        let ctx = self.forward_ctx(&self.base.store, x, lbda);
        self.layer_step(&ctx, state, layer_id)
    }

    /// Run the network and return the primal estimate after `output_layer`
    /// layers (all of them when `None`).
    pub fn forward(
        &self,
        x: &Mat<f64>,
        lbda: f64,
        output_layer: Option<usize>,
    ) -> Result<Mat<f64>, LpgdError> {
        let depth = self.base.check_output_layer(output_layer)?;
        self.check_features(x)?;
        self.forward_in(&self.base.store, x, lbda, depth)
    }

    /// Loss of the network output on a batch.
    pub fn score(
        &self,
        x: &Mat<f64>,
        lbda: f64,
        output_layer: Option<usize>,
    ) -> Result<f64, LpgdError> {
        let u = self.forward(x, lbda, output_layer)?;
        Ok(analysis_loss(&u, self.ops.a(), x, lbda, false))
    }

    /// Train the network on a batch by gradient descent through the
    /// unrolled iterations.
    pub fn fit(&mut self, x: &Mat<f64>, lbda: f64) -> Result<FitResult, LpgdError> {
        self.check_features(x)?;
        let stages: Vec<(usize, usize)> = match self.base.net_solver_type {
            NetSolverType::Recursive | NetSolverType::Independent => {
                vec![(self.base.n_layers, self.base.max_iter)]
            }
            NetSolverType::Progressive => {
                let budget = (self.base.max_iter / self.base.n_layers.max(1)).max(1);
                (1..=self.base.n_layers).map(|depth| (depth, budget)).collect()
            }
        };

        let mut trace = FitResult::default();
        if stages.is_empty() {
            trace.loss = self.score(x, lbda, None)?;
            trace.loss_history.push(trace.loss);
            trace.converged = true;
            return Ok(trace);
        }
        for (depth, budget) in stages {
            let names = self.base.trainable_group_names(depth);
            let layout = ParamLayout::for_groups(&self.base.store, &names);
            if layout.is_empty() {
                trace.loss = self.score(x, lbda, Some(depth))?;
                trace.loss_history.push(trace.loss);
                trace.converged = true;
                continue;
            }
            info!(
                "fitting '{}' up to layer {depth} ({} parameters, {budget} iterations)",
                self.base.name,
                layout.len()
            );
            let theta0 = self.base.store.flatten(&layout);
            let run = {
                let objective = NetObjective {
                    net: self,
                    layout: &layout,
                    x,
                    lbda,
                    output_layer: depth,
                };
                gradient_descent(
                    &objective,
                    &theta0,
                    &DescentParams {
                        max_iter: budget,
                        verbose: self.base.verbose,
                        ..DescentParams::default()
                    },
                )
            };
            self.base.store.assign(&layout, &run.theta);
            trace.absorb(&run);
        }
        Ok(trace)
    }

    fn forward_ctx<'a, T: Scalar<Float = f64>>(
        &self,
        params: &'a ParameterStore<T>,
        x: &Mat<f64>,
        lbda: f64,
    ) -> ForwardCtx<'a, T> {
        ForwardCtx {
            params,
            x: x.lift(),
            a: self.ops.a().lift(),
            a_t: self.ops.a_t().lift(),
            d: self.ops.d().lift(),
            d_t: self.ops.d_t().lift(),
            lbda_t: T::from_f(lbda),
        }
    }

    fn forward_in<T: Scalar<Float = f64>>(
        &self,
        params: &ParameterStore<T>,
        x: &Mat<f64>,
        lbda: f64,
        output_layer: usize,
    ) -> Result<Mat<T>, LpgdError> {
        let (v0, u0, _z0) = init_vuz(&self.ops, x, lbda, None);
        let mut state = LayerState {
            u: u0.lift::<T>(),
            v: self.carries_dual().then(|| v0.lift::<T>()),
        };
        let ctx = self.forward_ctx(params, x, lbda);
        for layer_id in 0..output_layer {
            state = self.layer_step(&ctx, &state, layer_id)?;
        }
        Ok(state.u)
    }

    fn layer_step<T: Scalar<Float = f64>>(
        &self,
        ctx: &ForwardCtx<'_, T>,
        state: &LayerState<T>,
        layer_id: usize,
    ) -> Result<LayerState<T>, LpgdError> {
        let group = ctx
            .params
            .group(&self.base.layer_key(layer_id))
            .expect("layer parameters are present");
        match self.variant {
            TvVariant::ListaTv => {
                let wu = group.tensor("Wu").expect("layer parameters are present");
                let wx = group.tensor("Wx").expect("layer parameters are present");
                let mul = group
                    .scalar("threshold")
                    .unwrap_or_else(|| T::from_f(1.0 / self.ops.l_a()));
                let u_half = state.u.matmul(wu).add(&ctx.x.matmul(wx));
                let (net, prox_params) = self.resolve_prox(ctx.params, layer_id);
                let z = net.forward_in(&prox_params, &u_half, ctx.lbda_t * mul, None)?;
                Ok(LayerState {
                    u: z.cumsum_rows(),
                    v: None,
                })
            }
            TvVariant::TautString => {
                let wu = group.tensor("Wu").expect("layer parameters are present");
                let wx = group.tensor("Wx").expect("layer parameters are present");
                let mul = group
                    .scalar("threshold")
                    .unwrap_or_else(|| T::from_f(1.0 / self.ops.l_a()));
                let u_half = state.u.matmul(wu).add(&ctx.x.matmul(wx));
                Ok(LayerState {
                    u: prox_tv_rows(&u_half, ctx.lbda_t * mul),
                    v: None,
                })
            }
            TvVariant::CoupledCondatVu => {
                let w = group
                    .tensor("W_coupled")
                    .expect("layer parameters are present");
                let mul = group.scalar("threshold").unwrap_or_else(T::one);
                let sigma = T::from_f(0.5);
                let tau = T::from_f(1.0 / (self.ops.l_a() / 2.0 + 0.5 * self.ops.l_d()));
                let (u, v) =
                    condat_vu_step(ctx, state, w, sigma, tau, T::one(), ctx.lbda_t * mul);
                Ok(LayerState { u, v: Some(v) })
            }
            TvVariant::StepCondatVu => {
                let sigma = group
                    .scalar("sigma")
                    .expect("layer parameters are present")
                    .max(T::from_f(0.5))
                    .min(T::from_f(2.0));
                let tau = T::one()
                    / (T::from_f(self.ops.l_a() / 2.0) + sigma * T::from_f(self.ops.l_d()));
                let (u, v) = condat_vu_step(ctx, state, &ctx.d, sigma, tau, T::one(), ctx.lbda_t);
                Ok(LayerState { u, v: Some(v) })
            }
            TvVariant::SubGradTv => {
                let step = group
                    .scalar("step_size")
                    .expect("layer parameters are present");
                let residual_grad = state.u.matmul(&ctx.a).sub(&ctx.x).matmul(&ctx.a_t);
                let tv_grad = state
                    .u
                    .matmul(&ctx.d)
                    .map(sign0)
                    .matmul(&ctx.d_t)
                    .scale(ctx.lbda_t);
                Ok(LayerState {
                    u: state.u.sub(&residual_grad.add(&tv_grad).scale(step)),
                    v: None,
                })
            }
        }
    }

    /// The prox network a layer runs, and the parameter store it reads.
    ///
    /// When the outer store carries trained prox parameters (global mode's
    /// top-level `prox` group, or the per-layer subgroups) those are used;
    /// otherwise the shared network's frozen analytic parameters are lifted
    /// as constants.
    fn resolve_prox<T: Scalar<Float = f64>>(
        &self,
        params: &ParameterStore<T>,
        layer_id: usize,
    ) -> (&ListaLASSO, ParameterStore<T>) {
        match self
            .prox
            .as_ref()
            .expect("the LISTA variant carries prox networks")
        {
            ProxNets::Shared(net) => {
                let store = match params.group("prox") {
                    Some(group) => group.to_store(),
                    None => net.parameters().lift::<T>(),
                };
                (net, store)
            }
            ProxNets::PerLayer(nets) => {
                let group = params
                    .group(&self.base.layer_key(layer_id))
                    .and_then(|g| g.subgroup("prox"))
                    .expect("layer parameters are present");
                let net = match self.base.net_solver_type {
                    NetSolverType::Recursive => &nets[0],
                    _ => &nets[layer_id],
                };
                (net, group.to_store())
            }
        }
    }
}

/// Analytic proximal-gradient initialization of the learned affine step:
/// `Wu = I - A A^T / ||A||^2`, `Wx = A^T / ||A||^2` and, when learned, a
/// threshold of `1 / ||A||^2`.
fn gradient_step_group(ops: &TvOperators, learn_th: bool) -> ParameterGroup<f64> {
    let l = ops.l_a();
    let mut group = ParameterGroup::new();
    group.insert(
        "Wu",
        Mat::eye(ops.n_atoms()).sub(&ops.a().matmul(ops.a_t()).scale(1.0 / l)),
    );
    group.insert("Wx", ops.a_t().scale(1.0 / l));
    if learn_th {
        group.insert_scalar("threshold", 1.0 / l);
    }
    group
}

fn install_layer_groups(base: &mut UnrolledNet, group: ParameterGroup<f64>) {
    for key in base.layer_keys() {
        base.store.insert_group(key, group.clone());
    }
}

fn build_prox_nets(
    ops: &TvOperators,
    cfg: &NetworkConfig,
    learn_prox: ProxLearn,
    shared_overrides: Option<ParameterStore<f64>>,
    n_instances: usize,
) -> Result<ProxNets, LpgdError> {
    let eye = Mat::eye(ops.n_atoms());
    match learn_prox {
        ProxLearn::None | ProxLearn::Global => {
            let mut prox_cfg = NetworkConfig::new(cfg.n_inner_layers).with_name("Prox-TV-Lista");
            if let Some(overrides) = shared_overrides {
                prox_cfg = prox_cfg.with_initial_parameters(overrides);
            }
            Ok(ProxNets::Shared(ListaLASSO::new(eye, &prox_cfg)?))
        }
        ProxLearn::PerLayer => {
            let mut nets = Vec::with_capacity(n_instances);
            for layer_id in 0..n_instances {
                let prox_cfg = NetworkConfig::new(cfg.n_inner_layers)
                    .with_name(format!("Prox-TV-Lista[layer={layer_id}]"));
                nets.push(ListaLASSO::new(eye.clone(), &prox_cfg)?);
            }
            Ok(ProxNets::PerLayer(nets))
        }
    }
}

/// One Condat-Vu update with relaxation `rho`.
fn condat_vu_step<T: Scalar<Float = f64>>(
    ctx: &ForwardCtx<'_, T>,
    state: &LayerState<T>,
    w: &Mat<T>,
    sigma: T,
    tau: T,
    rho: T,
    lbda: T,
) -> (Mat<T>, Mat<T>) {
    let u_old = &state.u;
    let v_old = state
        .v
        .as_ref()
        .expect("primal-dual variants carry a dual state");

    let residual = u_old.matmul(&ctx.a).sub(&ctx.x);
    let u_new = u_old
        .sub(&residual.matmul(&ctx.a_t).scale(tau))
        .sub(&v_old.matmul(&w.t()).scale(tau));
    let v_half = v_old.add(
        &u_new
            .scale(T::from_f(2.0))
            .sub(u_old)
            .matmul(w)
            .scale(sigma),
    );
    let inv_sigma = T::one() / sigma;
    let v_new =
        v_half.map(|e| e - sigma * pseudo_soft_threshold(e * inv_sigma, lbda, inv_sigma));

    let one = T::one();
    (
        u_new.scale(rho).add(&u_old.scale(one - rho)),
        v_new.scale(rho).add(&v_old.scale(one - rho)),
    )
}

/// Training objective: network loss as a function of the flattened
/// trainable parameters.
pub(crate) struct NetObjective<'a> {
    pub(crate) net: &'a AnalysisNetwork,
    pub(crate) layout: &'a ParamLayout,
    pub(crate) x: &'a Mat<f64>,
    pub(crate) lbda: f64,
    pub(crate) output_layer: usize,
}

impl Objective for NetObjective<'_> {
    fn eval(&self, theta: &[f64]) -> f64 {
        let params = self.net.base.store.lift_with::<f64>(self.layout, theta);
        let u = self
            .net
            .forward_in(&params, self.x, self.lbda, self.output_layer)
            .expect("network dimensions were validated before training");
        analysis_loss(&u, self.net.ops.a(), self.x, self.lbda, self.net.use_moreau)
    }

    fn eval_grad(&self, theta: &[f64]) -> (f64, Vec<f64>) {
        grad_with_value(
            |inputs: &[Reverse<f64>]| {
                let params = self.net.base.store.lift_with(self.layout, inputs);
                let u = self
                    .net
                    .forward_in(&params, self.x, self.lbda, self.output_layer)
                    .expect("network dimensions were validated before training");
                analysis_loss(
                    &u,
                    &self.net.ops.a().lift(),
                    &self.x.lift(),
                    self.lbda,
                    self.net.use_moreau,
                )
            },
            theta,
        )
    }
}
