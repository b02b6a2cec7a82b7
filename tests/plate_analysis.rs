use approx::{assert_abs_diff_eq, assert_relative_eq};
use siderite::{
    mesher, post_processor, solve, solve_with_backend, solver, Material, Model, SideriteError,
    SolverBackend,
};

fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn material() -> Material {
    init_test_logging();
    Material::new(1e6, 0.3).unwrap()
}

/// A unit plate clamped on the left and pulled rightward.
fn plate(nx: usize, ny: usize, traction: f64) -> Model {
    Model::new(nx, ny, 1.0, 1.0, material(), traction).unwrap()
}

/// Row-major node index of grid position `(i, j)`.
fn node_index(nx: usize, i: usize, j: usize) -> usize {
    j * (nx + 1) + i
}

#[test]
fn single_cell_plate_sanity() {
    let solution = solve(&plate(1, 1, 1000.0)).unwrap();

    assert_eq!(solution.nodes.len(), 4);
    assert_eq!(solution.elements.len(), 2);
    assert_eq!(solution.displacements.len(), 8);

    // Left pair pinned, right pair pulled in +x.
    for j in 0..=1 {
        let left = node_index(1, 0, j);
        assert_eq!(solution.displacements[2 * left], 0.0);
        assert_eq!(solution.displacements[2 * left + 1], 0.0);

        let right = node_index(1, 1, j);
        assert!(solution.displacements[2 * right] > 0.0);
    }
}

#[test]
fn stretched_plate_baseline() {
    let model = plate(2, 2, 1000.0);
    let solution = solve(&model).unwrap();

    assert_eq!(solution.nodes.len(), 9);
    assert_eq!(solution.elements.len(), 8);
    assert_eq!(solution.displacements.len(), 2 * model.num_nodes());
    assert!(solution.displacements.iter().all(|u| u.is_finite()));

    // The clamped edge does not move at all.
    for j in 0..=2 {
        let n = node_index(2, 0, j);
        assert_eq!(solution.displacements[2 * n], 0.0);
        assert_eq!(solution.displacements[2 * n + 1], 0.0);
    }

    // The loaded edge extends in the pull direction.
    for j in 0..=2 {
        let n = node_index(2, 2, j);
        assert!(solution.displacements[2 * n] > 0.0);
    }

    // Poisson contraction pulls the free corners toward the midline.
    assert!(solution.nodes[node_index(2, 2, 2)].uy.unwrap() < 0.0);
    assert!(solution.nodes[node_index(2, 2, 0)].uy.unwrap() > 0.0);

    // Node fields mirror the displacement vector.
    for (i, node) in solution.nodes.iter().enumerate() {
        assert_eq!(node.ux, Some(solution.displacements[2 * i]));
        assert_eq!(node.uy, Some(solution.displacements[2 * i + 1]));
    }

    // Every element sees some stress in this load case.
    for element in &solution.elements {
        assert!(element.stress.unwrap() > 0.0);
    }
}

#[test]
fn displacement_grows_along_the_pull_direction() {
    let solution = solve(&plate(4, 4, 1000.0)).unwrap();

    // Along the midline row the plate is in tension everywhere, so ux rises
    // monotonically from the clamp to the loaded edge.
    let mut previous = 0.0;
    for i in 0..=4 {
        let ux = solution.displacements[2 * node_index(4, i, 2)];
        assert!(ux >= previous, "ux fell from {previous} to {ux} at i={i}");
        previous = ux;
    }
    assert!(previous > 0.0);
}

#[test]
fn traction_scaling_is_linear() {
    let base = solve(&plate(2, 2, 500.0)).unwrap();
    let double = solve(&plate(2, 2, 1000.0)).unwrap();

    for i in 0..base.displacements.len() {
        assert_relative_eq!(
            2.0 * base.displacements[i],
            double.displacements[i],
            epsilon = 1e-15,
            max_relative = 1e-12
        );
    }
}

#[test]
fn stiffness_scaling_is_inverse() {
    init_test_logging();
    let soft = Material::new(1e6, 0.3).unwrap();
    let stiff = Material::new(2e6, 0.3).unwrap();

    let soft_solution = solve(&Model::new(2, 2, 1.0, 1.0, soft, 1000.0).unwrap()).unwrap();
    let stiff_solution = solve(&Model::new(2, 2, 1.0, 1.0, stiff, 1000.0).unwrap()).unwrap();

    for i in 0..soft_solution.displacements.len() {
        assert_relative_eq!(
            soft_solution.displacements[i],
            2.0 * stiff_solution.displacements[i],
            epsilon = 1e-15,
            max_relative = 1e-9
        );
    }
}

#[test]
fn thicker_part_deforms_less() {
    let thin = solve(&plate(2, 2, 1000.0)).unwrap();
    let thick = solve(&plate(2, 2, 1000.0).with_thickness(2.0).unwrap()).unwrap();

    for i in 0..thin.displacements.len() {
        assert_relative_eq!(
            thin.displacements[i],
            2.0 * thick.displacements[i],
            epsilon = 1e-15,
            max_relative = 1e-9
        );
    }
}

#[test]
fn zero_traction_leaves_the_plate_at_rest() {
    let solution = solve(&plate(3, 2, 0.0)).unwrap();

    for u in solution.displacements.iter() {
        assert_eq!(*u, 0.0);
    }
    for element in &solution.elements {
        assert_eq!(element.stress, Some(0.0));
    }
}

#[test]
fn vertical_contraction_is_balanced() {
    let solution = solve(&plate(4, 4, 2000.0)).unwrap();

    // Poisson contraction is antisymmetric about the horizontal midline.
    // The split diagonals break exact mirror symmetry of the mesh, so at
    // this resolution the corner magnitudes agree only within a factor of
    // two.
    let top = solution.nodes[node_index(4, 4, 4)].uy.unwrap();
    let bottom = solution.nodes[node_index(4, 4, 0)].uy.unwrap();

    assert!(top < 0.0);
    assert!(bottom > 0.0);
    assert_relative_eq!(-top, bottom, max_relative = 0.5);

    // The midline itself stays put, up to discretization noise.
    let mid = solution.nodes[node_index(4, 4, 2)].uy.unwrap();
    assert!(mid.abs() < bottom);
}

#[test]
fn reactions_balance_the_applied_load() {
    let (nx, ny) = (3, 3);
    let traction = 1200.0;
    let solution = solve(&plate(nx, ny, traction)).unwrap();

    // Each of the ny + 1 right-edge nodes carries traction / ny, so the
    // total applied load is traction * (ny + 1) / ny.
    let applied = traction * (ny as f64 + 1.0) / ny as f64;

    let mut reaction_x = 0.0;
    let mut reaction_y = 0.0;
    for j in 0..=ny {
        let node = &solution.nodes[node_index(nx, 0, j)];
        reaction_x += node.fx.unwrap();
        reaction_y += node.fy.unwrap();
    }

    assert_relative_eq!(reaction_x, -applied, max_relative = 1e-6);
    assert_abs_diff_eq!(reaction_y, 0.0, epsilon = 1e-6 * applied);
}

#[test]
fn conjugate_gradient_agrees_with_cholesky() {
    let model = plate(4, 3, 1500.0);
    let direct = solve_with_backend(&model, SolverBackend::Cholesky).unwrap();
    let iterative = solve_with_backend(&model, SolverBackend::ConjugateGradient).unwrap();

    let scale = direct.displacements.amax();
    assert!(scale > 0.0);
    for i in 0..direct.displacements.len() {
        assert_abs_diff_eq!(
            direct.displacements[i],
            iterative.displacements[i],
            epsilon = 1e-5 * scale
        );
    }
}

#[test]
fn hand_built_degenerate_mesh_is_rejected() {
    let model = Model::new(1, 1, 1.0, 1.0, material(), 100.0).unwrap();
    let (mut nodes, mut elements) = mesher::generate(1, 1, 1.0, 1.0).unwrap();
    mesher::apply_edge_conditions(&mut nodes, 1, 1, 100.0).unwrap();

    // Collapsing the top-right node onto the bottom-right one flattens the
    // upper triangle while leaving the lower one intact.
    nodes[3].vertex = nodes[1].vertex;

    match solver::run(&mut nodes, &mut elements, &model, SolverBackend::Cholesky) {
        Err(SideriteError::DegenerateElement { index, .. }) => assert_eq!(index, 1),
        other => panic!("expected a degenerate element error, got {other:?}"),
    }
}

#[test]
fn unconstrained_plate_is_reported_singular() {
    let model = Model::new(2, 2, 1.0, 1.0, material(), 0.0).unwrap();
    let (mut nodes, mut elements) = mesher::generate(2, 2, 1.0, 1.0).unwrap();

    // No edge conditions: rigid body motion is unresisted, so loading any
    // node gives a system with no unique solution.
    nodes[0].fx = Some(100.0);

    match solver::run(&mut nodes, &mut elements, &model, SolverBackend::Cholesky) {
        Err(SideriteError::SingularSystem(_)) => {}
        other => panic!("expected a singular system error, got {other:?}"),
    }
}

#[test]
fn results_export_round_trip() {
    let solution = solve(&plate(2, 2, 1000.0)).unwrap();

    let dir = std::env::temp_dir();
    let nodes_path = dir.join("siderite_plate_nodes.csv");
    let elements_path = dir.join("siderite_plate_elements.csv");
    let json_path = dir.join("siderite_plate_results.json");

    post_processor::csv_output(
        &solution.elements,
        &solution.nodes,
        nodes_path.to_str().unwrap(),
        elements_path.to_str().unwrap(),
    )
    .unwrap();
    post_processor::json_output(&solution.elements, &solution.nodes, json_path.to_str().unwrap())
        .unwrap();

    let nodes_csv = std::fs::read_to_string(&nodes_path).unwrap();
    assert_eq!(nodes_csv.lines().count(), solution.nodes.len() + 1);
    let elements_csv = std::fs::read_to_string(&elements_path).unwrap();
    assert_eq!(elements_csv.lines().count(), solution.elements.len() + 1);

    let results = json::parse(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(results["nodes"].len(), solution.nodes.len());
    assert_eq!(results["elements"].len(), solution.elements.len());
    assert_eq!(results["nodes"][0]["ux"].as_f64(), Some(0.0));

    let deformed = post_processor::deformed_vertices(
        &solution.nodes,
        post_processor::DEFAULT_DISPLACEMENT_SCALE,
    )
    .unwrap();
    assert_eq!(deformed.len(), solution.nodes.len());
    // The loaded edge visibly moves right under the default exaggeration.
    assert!(deformed[node_index(2, 2, 1)].x > 1.0);

    std::fs::remove_file(nodes_path).unwrap();
    std::fs::remove_file(elements_path).unwrap();
    std::fs::remove_file(json_path).unwrap();
}
