use pdhg_linop::{
    Block, BlockGradient2D, BlockGradient3D, BlockIdentity, BlockZero, DiagonalPreconditioner,
    LinearOperator, Matrix, PdhgCoreError,
};

fn assert_approx_eq_vec(a: &[f64], b: &[f64], tolerance: f64) {
    assert_eq!(a.len(), b.len(), "Vector lengths differ");
    for i in 0..a.len() {
        let diff = (a[i] - b[i]).abs();
        assert!(
            diff <= tolerance,
            "Verification failed at index {}: expected {}, got {}, diff {}",
            i,
            b[i],
            a[i],
            diff
        );
    }
}

fn random_vec(rng: &mut fastrand::Rng, n: usize) -> Vec<f64> {
    (0..n).map(|_| rng.f64() * 2.0 - 1.0).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn block_forward(block: &dyn Block<f64>, x: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; block.nrows()];
    block.eval_local_add_host(&mut y, x);
    y
}

/// `[∇; I]` acting on one image.
fn stacked_operator(nx: usize, ny: usize, nl: usize) -> LinearOperator<f64> {
    let n = nx * ny * nl;
    LinearOperator::new(vec![
        Box::new(BlockGradient3D::new(0, 0, nx, ny, nl, false).unwrap()),
        Box::new(BlockIdentity::new(3 * n, 0, n).unwrap()),
    ])
    .unwrap()
}

#[test]
fn test_line_scenario_through_operator() -> Result<(), PdhgCoreError> {
    let op = LinearOperator::<f64>::new(vec![Box::new(BlockGradient3D::new(
        0, 0, 3, 1, 1, false,
    )?)])?;
    assert_eq!(op.dims(), (9, 3));

    let mut y = vec![0.0; 9];
    op.eval_host(&mut y, &[1.0, 2.0, 5.0])?;
    assert_eq!(y, vec![1.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

    let mut x = vec![0.0; 3];
    op.eval_adjoint_host(&mut x, &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0])?;
    assert_eq!(x, vec![-1.0, 0.0, 1.0]);
    Ok(())
}

#[test]
fn test_stacked_blocks_concatenate() -> Result<(), PdhgCoreError> {
    let (nx, ny, nl) = (3, 2, 2);
    let n = nx * ny * nl;
    let op = stacked_operator(nx, ny, nl);
    assert_eq!(op.dims(), (4 * n, n));

    let mut rng = fastrand::Rng::with_seed(21);
    let x = random_vec(&mut rng, n);
    let mut y = vec![0.0; op.nrows()];
    op.eval_host(&mut y, &x)?;

    let grad = BlockGradient3D::new(0, 0, nx, ny, nl, false)?;
    let mut expected = block_forward(&grad, &x);
    expected.extend_from_slice(&x);
    assert_eq!(y, expected);
    Ok(())
}

#[test]
fn test_side_by_side_blocks_sum() -> Result<(), PdhgCoreError> {
    // y = ∇u + I·p over the same rows.
    let (nx, ny) = (4, 3);
    let n = nx * ny;
    let op = LinearOperator::<f64>::new(vec![
        Box::new(BlockGradient2D::new(0, 0, nx, ny, 1, false)?),
        Box::new(BlockIdentity::new(0, n, 2 * n)?),
    ])?;
    assert_eq!(op.dims(), (2 * n, 3 * n));

    let mut rng = fastrand::Rng::with_seed(5);
    let x = random_vec(&mut rng, 3 * n);
    let mut y = vec![0.0; 2 * n];
    op.eval_host(&mut y, &x)?;

    let grad = BlockGradient2D::new(0, 0, nx, ny, 1, false)?;
    let expected: Vec<f64> = block_forward(&grad, &x[..n])
        .iter()
        .zip(&x[n..])
        .map(|(g, p)| g + p)
        .collect();
    assert_approx_eq_vec(&y, &expected, 1e-12);
    Ok(())
}

#[test]
fn test_side_by_side_gradients_sum() -> Result<(), PdhgCoreError> {
    // y = ∇u + ∇w, with u pixel-first and w label-first.
    let (nx, ny, nl) = (4, 3, 2);
    let n = nx * ny * nl;
    let pixel_first = BlockGradient3D::new(0, 0, nx, ny, nl, false)?;
    let label_first = BlockGradient3D::new(0, n, nx, ny, nl, true)?;
    let op = LinearOperator::<f64>::new(vec![
        Box::new(pixel_first.clone()),
        Box::new(label_first.clone()),
    ])?;
    assert_eq!(op.dims(), (3 * n, 2 * n));

    let mut rng = fastrand::Rng::with_seed(9);
    let x = random_vec(&mut rng, 2 * n);
    let mut y = vec![0.0; 3 * n];
    op.eval_host(&mut y, &x)?;
    let expected: Vec<f64> = block_forward(&pixel_first, &x[..n])
        .iter()
        .zip(block_forward(&label_first, &x[n..]))
        .map(|(a, b)| a + b)
        .collect();
    assert_approx_eq_vec(&y, &expected, 1e-12);

    let v = random_vec(&mut rng, 3 * n);
    let mut xt = vec![0.0; 2 * n];
    op.eval_adjoint_host(&mut xt, &v)?;
    let mut expected_t = vec![0.0f64; 2 * n];
    pixel_first.eval_adjoint_local_add_host(&mut expected_t[..n], &v);
    label_first.eval_adjoint_local_add_host(&mut expected_t[n..], &v);
    assert_approx_eq_vec(&xt, &expected_t, 1e-12);
    assert!((dot(&y, &v) - dot(&x, &xt)).abs() <= 1e-10 * (1.0 + dot(&y, &v).abs()));
    Ok(())
}

#[test]
fn test_composite_adjoint_law() -> Result<(), PdhgCoreError> {
    let (nx, ny) = (5, 4);
    let n = nx * ny;
    let op = LinearOperator::<f64>::new(vec![
        Box::new(BlockGradient3D::new(0, 0, nx, ny, 1, true)?),
        Box::new(BlockIdentity::new(0, n, 3 * n)?),
        Box::new(BlockGradient2D::new(3 * n, 0, nx, ny, 1, false)?),
        Box::new(BlockZero::new(3 * n, n, 2 * n, 3 * n)?),
    ])?;

    let mut rng = fastrand::Rng::with_seed(99);
    for _ in 0..5 {
        let u = random_vec(&mut rng, op.ncols());
        let v = random_vec(&mut rng, op.nrows());
        let mut au = vec![0.0; op.nrows()];
        op.eval_host(&mut au, &u)?;
        let mut atv = vec![0.0; op.ncols()];
        op.eval_adjoint_host(&mut atv, &v)?;
        let (lhs, rhs) = (dot(&au, &v), dot(&u, &atv));
        assert!((lhs - rhs).abs() < 1e-10, "{} != {}", lhs, rhs);
    }
    Ok(())
}

#[test]
fn test_operator_sums_add_block_contributions() -> Result<(), PdhgCoreError> {
    let op = stacked_operator(3, 1, 1);
    // Column 1 is an interior voxel of the gradient plus one identity entry.
    assert_eq!(op.col_sum(1, 1.0), 3.0);
    assert_eq!(op.col_sum(0, 1.0), 2.0);
    assert_eq!(op.row_sum(0, 1.0), 2.0);
    assert_eq!(op.row_sum(6, 1.0), 0.0);
    assert_eq!(op.row_sum(9, 1.0), 1.0);
    Ok(())
}

#[test]
fn test_construction_errors() {
    assert!(matches!(
        LinearOperator::<f32>::new(Vec::new()),
        Err(PdhgCoreError::EmptyOperator)
    ));

    assert!(matches!(
        BlockGradient3D::new(0, 0, 4, 4, 0, true),
        Err(PdhgCoreError::InvalidDimensions(_))
    ));

    let overlap = LinearOperator::<f32>::new(vec![
        Box::new(BlockIdentity::new(0, 0, 4).unwrap()),
        Box::new(BlockIdentity::new(2, 2, 4).unwrap()),
    ]);
    match overlap {
        Err(PdhgCoreError::BlockOverlap {
            first,
            second,
            second_rows,
            ..
        }) => {
            assert_eq!((first, second), (0, 1));
            assert_eq!(second_rows, 2..6);
        }
        other => panic!("expected BlockOverlap, got {:?}", other),
    }

    let column_gap = LinearOperator::<f32>::new(vec![
        Box::new(BlockIdentity::new(0, 0, 2).unwrap()),
        Box::new(BlockIdentity::new(2, 3, 2).unwrap()),
    ]);
    assert!(matches!(column_gap, Err(PdhgCoreError::ColumnGap(2))));
}

#[test]
fn test_preconditioner_on_line_gradient() -> Result<(), PdhgCoreError> {
    let op = LinearOperator::<f64>::new(vec![Box::new(BlockGradient3D::new(
        0, 0, 3, 1, 1, false,
    )?)])?;
    let precond = DiagonalPreconditioner::compute(&op, 1.0)?;
    assert_eq!(
        precond.left,
        vec![0.5, 1.0, 1.0, 0.5, 1.0, 1.0, 1.0, 1.0, 1.0]
    );
    assert_eq!(precond.right, vec![1.0, 0.5, 1.0]);

    assert!(matches!(
        DiagonalPreconditioner::compute(&op, -1.0),
        Err(PdhgCoreError::InvalidParameter(_))
    ));
    assert!(matches!(
        DiagonalPreconditioner::compute(&op, 2.5),
        Err(PdhgCoreError::InvalidParameter(_))
    ));
    Ok(())
}

#[test]
fn test_preconditioned_operator_is_contractive() -> Result<(), PdhgCoreError> {
    let (nx, ny, nl) = (4, 3, 2);
    let op = stacked_operator(nx, ny, nl);
    let precond = DiagonalPreconditioner::compute(&op, 1.0)?;
    let sigma: Vec<f64> = precond.left.iter().map(|s| s.sqrt()).collect();
    let tau: Vec<f64> = precond.right.iter().map(|t| t.sqrt()).collect();

    // ‖Σ^½ A T^½ x‖ ≤ ‖x‖ for random x.
    let mut rng = fastrand::Rng::with_seed(3);
    for _ in 0..10 {
        let x = random_vec(&mut rng, op.ncols());
        let scaled: Vec<f64> = x.iter().zip(&tau).map(|(a, b)| a * b).collect();
        let mut y = vec![0.0; op.nrows()];
        op.eval_host(&mut y, &scaled)?;
        let y: Vec<f64> = y.iter().zip(&sigma).map(|(a, b)| a * b).collect();
        assert!(dot(&y, &y) <= dot(&x, &x) * (1.0 + 1e-12));
    }
    Ok(())
}
