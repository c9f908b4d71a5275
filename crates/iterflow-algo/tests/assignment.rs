//! End-to-end assignment tests solved with the Clarabel backend

use std::sync::Arc;

use iterflow_algo::options::{generate_options, OptionRules};
use iterflow_algo::{
    free_flow_times, AssignmentConfig, ClarabelOracle, EquilibriumAssembler, FlowAveraging,
    IterationController, ModelInputs, OptimizationOracle, TerminalState, TimeExpansion,
};
use iterflow_core::{
    BackgroundTraffic, Link, LinkKey, Network, Node, NodeId, PathChoice, PathId, Scenario, Trip,
    TripId,
};

fn key(from: usize, to: usize) -> LinkKey {
    LinkKey::new(NodeId::new(from), NodeId::new(to))
}

/// Two nodes joined by one link: 5 minutes free flow, 20 vehicles per slot.
fn single_link(demand: f64) -> Scenario {
    let mut network = Network::new();
    network.add_node(Node::new(NodeId::new(1), "origin"));
    network.add_node(Node::new(NodeId::new(2), "destination"));
    network
        .add_link(Link::new(NodeId::new(1), NodeId::new(2), 5.0, 20.0))
        .unwrap();

    let trip = Trip::new(TripId::new(1), demand)
        .with_path(PathChoice::new(PathId::new(0), vec![key(1, 2)]).with_departure_slots([0]));
    Scenario::new(network, vec![trip])
}

/// Route 1→2→3 (10 + 10 min) against the direct 1→3 link (24 min).
fn two_routes() -> Scenario {
    let mut network = Network::new();
    for id in 1..=3 {
        network.add_node(Node::new(NodeId::new(id), format!("n{id}")));
    }
    network
        .add_link(Link::new(NodeId::new(1), NodeId::new(2), 10.0, 20.0))
        .unwrap();
    network
        .add_link(Link::new(NodeId::new(2), NodeId::new(3), 10.0, 20.0))
        .unwrap();
    network
        .add_link(Link::new(NodeId::new(1), NodeId::new(3), 24.0, 10.0))
        .unwrap();

    let trips = vec![
        Trip::new(TripId::new(1), 60.0)
            .with_path(
                PathChoice::new(PathId::new(0), vec![key(1, 2), key(2, 3)])
                    .with_departure_slots([0, 1, 2]),
            )
            .with_path(PathChoice::new(PathId::new(1), vec![key(1, 3)]).with_departure_slots([0, 1])),
        Trip::new(TripId::new(2), 15.0)
            .with_path(PathChoice::new(PathId::new(0), vec![key(2, 3)]).with_departure_slots([1, 2])),
    ];

    let mut background = BackgroundTraffic::new();
    background.set(key(1, 2), 1, 5.0);
    background.set(key(2, 3), 2, 3.0);
    Scenario::new(network, trips).with_background(background)
}

fn small_config() -> AssignmentConfig {
    AssignmentConfig::default().with_horizon_slots(4)
}

fn controller(config: AssignmentConfig) -> IterationController {
    IterationController::new(config, Arc::new(ClarabelOracle::new()))
}

#[test]
fn uncongested_trip_is_fully_assigned() {
    let outcome = controller(small_config()).run(&single_link(10.0)).unwrap();
    assert!(outcome.is_success());

    let first = &outcome.iterations[0];
    assert!((first.assigned - 10.0).abs() < 1e-3, "assigned {}", first.assigned);
    assert!(first.unmet < 1e-3);
    assert!((first.assignment_rate - 100.0).abs() < 1e-2);
    assert!(first.tstt > 0.0);

    let iterate = outcome.final_iterate.as_ref().unwrap();
    assert_eq!(iterate.records.len(), 1);
    let record = &iterate.records[0];
    assert_eq!(record.departure_slot, 0);
    assert_eq!(record.free_flow_time, 5.0);
    assert!((record.vehicles_assigned - 10.0).abs() < 1e-3);
    assert!((record.modeled_travel_time - 5.0).abs() < 0.1);
    assert!(record.effective_time >= 5.0 && record.effective_time < 5.01);
}

#[test]
fn oversubscribed_link_saturates_at_ceiling() {
    let config = small_config();
    let ceiling = config.utilization_ceiling() * 20.0;
    let outcome = controller(config).run(&single_link(1000.0)).unwrap();
    assert!(outcome.is_success());

    let first = &outcome.iterations[0];
    assert!(first.assigned <= ceiling + 1e-4);
    assert!(first.assigned > ceiling - 1e-2);
    assert!((first.assigned + first.unmet - 1000.0).abs() < 1e-3);

    let iterate = outcome.final_iterate.as_ref().unwrap();
    let peak = iterate.cell_flows.get(&key(1, 2), 0);
    assert!(peak <= ceiling + 1e-4);
    assert!(iterate.records[0].inconvenience > 1.0);
    assert!(iterate.records[0].effective_time > 5.0);
    assert!(iterate.overall.average_inconvenience > 1.0);
}

#[test]
fn identical_rebuild_converges_on_second_iteration() {
    let outcome = controller(small_config()).run(&single_link(10.0)).unwrap();
    assert_eq!(outcome.terminal, TerminalState::Converged);
    assert_eq!(outcome.trace.len(), 2);
    assert_eq!(outcome.trace[0].relative_change, None);
    assert!(outcome.trace[1].relative_change.unwrap() < 0.05);
    assert!(outcome.trace.iter().all(|r| r.optimal));
}

#[test]
fn single_iteration_never_converges() {
    let config = small_config().with_max_iterations(1);
    let outcome = controller(config).run(&single_link(10.0)).unwrap();
    assert_eq!(outcome.terminal, TerminalState::IterationLimit);
    assert_eq!(outcome.trace.len(), 1);
    assert!(outcome.trace[0].tstt >= 0.0);
}

#[test]
fn solved_model_respects_demand_and_flow_identities() {
    let scenario = two_routes();
    let config = AssignmentConfig::default().with_horizon_slots(6);
    let times = free_flow_times(&scenario.network);
    let expansion = TimeExpansion::new(&scenario.network, &times, config.slot_minutes);
    let options = generate_options(
        &scenario.network,
        &scenario.trips,
        &times,
        &expansion,
        OptionRules::from(&config),
    );
    assert_eq!(options.len(), 7);

    let model = EquilibriumAssembler::new(config)
        .build(ModelInputs {
            network: &scenario.network,
            trips: &scenario.trips,
            background: &scenario.background,
            options: &options,
            expansion: &expansion,
        })
        .unwrap();
    let solution = ClarabelOracle::new().solve(&model.lp).unwrap();
    assert!(solution.status.is_optimal());
    let x = solution.primal.unwrap();
    let layout = &model.layout;

    for (t, trip) in scenario.trips.iter().enumerate() {
        let assigned: f64 = options
            .options_of_trip(t)
            .map(|(o, _)| x[layout.option_flows[o].index()])
            .sum();
        let shortfall = x[layout.shortfalls[t].index()];
        assert!((assigned + shortfall - trip.demand).abs() < 1e-4 * trip.demand.max(1.0));
    }

    for cv in &layout.cells {
        let users: f64 = options
            .incidence
            .get(&cv.cell)
            .map(|os| os.iter().map(|&o| x[layout.option_flows[o].index()]).sum())
            .unwrap_or(0.0);
        let flow = x[cv.flow.index()];
        assert!((flow - cv.background - users).abs() < 1e-4);
        let segments: f64 = cv.segments.iter().map(|s| x[s.index()]).sum();
        assert!((flow - segments).abs() < 1e-4);
    }
}

#[test]
fn averaging_mode_changes_next_travel_times() {
    let scenario = single_link(1000.0);
    let all = controller(small_config().with_max_iterations(1))
        .run(&scenario)
        .unwrap();
    let positive = controller(
        small_config()
            .with_max_iterations(1)
            .with_flow_averaging(FlowAveraging::Positive),
    )
    .run(&scenario)
    .unwrap();

    let t_all = all.final_iterate.unwrap().effective_times[&key(1, 2)];
    let t_peak = positive.final_iterate.unwrap().effective_times[&key(1, 2)];
    // Mean over four slots sees a quarter of the peak flow
    assert!(t_peak > 2.0 * t_all, "peak {t_peak} vs all-slot {t_all}");
}
