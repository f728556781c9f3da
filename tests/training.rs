use approx::assert_relative_eq;
use lpgd::{AnalysisNetwork, Mat, NetSolverType, NetworkConfig, ProxLearn};

fn test_operator() -> Mat<f64> {
    Mat::from_rows(vec![
        vec![1.0, 0.4, 0.0, 0.2],
        vec![0.3, 1.0, 0.5, 0.0],
        vec![0.0, 0.2, 1.0, 0.6],
    ])
}

fn test_batch() -> Mat<f64> {
    Mat::from_rows(vec![
        vec![0.8, -0.3, 0.5, 0.1],
        vec![-0.2, 0.9, 0.4, -0.7],
        vec![0.4, 0.4, -0.6, 1.1],
    ])
}

#[test]
fn fitting_lowers_the_training_loss() {
    let cfg = NetworkConfig::new(2)
        .with_learn_th(true)
        .with_use_moreau(false)
        .with_max_iter(10);
    let mut net = AnalysisNetwork::lpgd_taut_string(test_operator(), &cfg).unwrap();
    let x = test_batch();
    let lbda = 0.3;

    let before = net.score(&x, lbda, None).unwrap();
    let trace = net.fit(&x, lbda).unwrap();

    assert_relative_eq!(trace.loss_history[0], before, max_relative = 1e-12);
    assert!(trace.loss < before, "no progress: {} -> {}", before, trace.loss);
    assert!(
        trace.loss_history.windows(2).all(|w| w[1] <= w[0]),
        "line search accepted an ascent step"
    );
    assert_eq!(trace.loss_history.len(), trace.iterations + 1);
    assert!(trace.iterations <= 10);

    // The trained parameters are installed on the network.
    let rescored = net.score(&x, lbda, None).unwrap();
    assert_relative_eq!(rescored, trace.loss, max_relative = 1e-12);
}

#[test]
fn moreau_training_never_raises_the_reported_loss() {
    // The default taut-string net trains through the Moreau envelope; the
    // reported losses are still the exact objective.
    let cfg = NetworkConfig::new(2).with_learn_th(true).with_max_iter(6);
    let mut net = AnalysisNetwork::lpgd_taut_string(test_operator(), &cfg).unwrap();
    let x = test_batch();

    let trace = net.fit(&x, 0.3).unwrap();
    assert!(!trace.loss_history.is_empty());
    assert!(trace.loss_history.iter().all(|l| l.is_finite()));
    assert!(trace.loss <= trace.loss_history[0]);
}

#[test]
fn recursive_layers_share_their_parameters() {
    let cfg = NetworkConfig::new(4).with_use_moreau(false).with_max_iter(3);
    let mut net = AnalysisNetwork::lpgd_taut_string(test_operator(), &cfg).unwrap();

    let groups = |net: &AnalysisNetwork| -> Vec<String> {
        net.parameters().groups().map(|(k, _)| k.to_string()).collect()
    };
    assert_eq!(groups(&net), vec!["layer-0".to_string()]);

    net.fit(&test_batch(), 0.3).unwrap();
    assert_eq!(groups(&net), vec!["layer-0".to_string()]);
}

#[test]
fn independent_layers_train_apart() {
    let cfg = NetworkConfig::new(2)
        .with_net_solver_type(NetSolverType::Independent)
        .with_use_moreau(false)
        .with_max_iter(8);
    let mut net = AnalysisNetwork::coupled_condat_vu(test_operator(), &cfg).unwrap();

    let coupling = |net: &AnalysisNetwork, key: &str| -> Vec<f64> {
        net.parameters()
            .group(key)
            .unwrap()
            .tensor("W_coupled")
            .unwrap()
            .data()
            .to_vec()
    };
    assert_eq!(
        coupling(&net, "layer-0"),
        coupling(&net, "layer-1"),
        "both layers start from the difference operator"
    );

    let x = test_batch();
    let before = net.score(&x, 0.3, None).unwrap();
    let trace = net.fit(&x, 0.3).unwrap();
    assert!(trace.loss < before);

    let gap = coupling(&net, "layer-0")
        .iter()
        .zip(coupling(&net, "layer-1"))
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f64, f64::max);
    assert!(gap > 1e-12, "layers stayed tied after training: {gap}");
}

#[test]
fn progressive_fitting_walks_through_the_depths() {
    let cfg = NetworkConfig::new(3)
        .with_net_solver_type(NetSolverType::Progressive)
        .with_use_moreau(false)
        .with_max_iter(9);
    let mut net = AnalysisNetwork::lpgd_taut_string(test_operator(), &cfg).unwrap();
    let x = test_batch();

    let trace = net.fit(&x, 0.3).unwrap();

    // Three stages of three iterations each; every stage re-records its
    // starting loss at the deeper output.
    assert!(trace.iterations <= 9);
    assert_eq!(trace.loss_history.len(), trace.iterations + 3);

    // The reported loss is the full-depth loss of the installed parameters.
    let rescored = net.score(&x, 0.3, None).unwrap();
    assert_relative_eq!(rescored, trace.loss, max_relative = 1e-12);
}

#[test]
fn global_prox_parameters_receive_updates() {
    let cfg = NetworkConfig::new(1)
        .with_learn_prox(ProxLearn::Global)
        .with_n_inner_layers(3)
        .with_use_moreau(false)
        .with_max_iter(4);
    let mut net = AnalysisNetwork::lista_tv(test_operator(), &cfg).unwrap();

    let inner_weights = |net: &AnalysisNetwork| -> Vec<f64> {
        net.parameters()
            .group("prox")
            .unwrap()
            .subgroup("layer-0")
            .unwrap()
            .tensor("Wz")
            .unwrap()
            .data()
            .to_vec()
    };
    let before = inner_weights(&net);
    net.fit(&test_batch(), 0.3).unwrap();
    let after = inner_weights(&net);

    let gap = before
        .iter()
        .zip(&after)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f64, f64::max);
    assert!(gap > 1e-15, "the shared prox never moved");
}

#[test]
fn an_empty_network_scores_without_training() {
    let cfg = NetworkConfig::new(0)
        .with_net_solver_type(NetSolverType::Progressive)
        .with_max_iter(5);
    let mut net = AnalysisNetwork::lpgd_taut_string(test_operator(), &cfg).unwrap();
    let x = test_batch();

    let trace = net.fit(&x, 0.3).unwrap();
    assert_eq!(trace.iterations, 0);
    assert!(trace.converged);
    assert_eq!(trace.loss_history, vec![net.score(&x, 0.3, None).unwrap()]);
}
