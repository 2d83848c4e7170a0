//! Matrix engine (C2): Cholesky factorization, principal square root, and
//! quarter root of a transition matrix.
//!
//! This is the one floating-point surface in the engine: it factors
//! correlation and rating-transition matrices to seed the Monte-Carlo
//! credit-migration simulator (`migration`), never money. Everything here
//! operates on plain `nalgebra::DMatrix<f64>`.

use nalgebra::DMatrix;

use crate::error::EngineError;
use crate::EngineResult;

/// Cholesky factor `L` such that `L * L^T = C` for a positive-semidefinite
/// correlation matrix. If the minimum eigenvalue is non-positive, `ε*I` is
/// added until the matrix is positive-definite.
pub fn cholesky(c: &DMatrix<f64>) -> EngineResult<DMatrix<f64>> {
    if c.nrows() != c.ncols() {
        return Err(EngineError::BadInput {
            field: "matrix".into(),
            reason: "correlation matrix must be square".into(),
        });
    }

    let mut adjusted = c.clone();
    let min_eig = min_eigenvalue(&adjusted);
    if min_eig <= 0.0 {
        let epsilon = -min_eig + 1e-10;
        for i in 0..adjusted.nrows() {
            adjusted[(i, i)] += epsilon;
        }
    }

    match adjusted.clone().cholesky() {
        Some(chol) => Ok(chol.l()),
        None => Err(EngineError::BadInput {
            field: "matrix".into(),
            reason: "matrix is not positive-definite even after epsilon adjustment".into(),
        }),
    }
}

fn min_eigenvalue(m: &DMatrix<f64>) -> f64 {
    let eigen = m.clone().symmetric_eigen();
    eigen
        .eigenvalues
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min)
}

/// Principal square root `S` of a symmetric positive-semidefinite matrix
/// such that `S * S^T ≈ M`, via eigendecomposition with negative
/// eigenvalues zeroed out.
pub fn pseudo_sqrt(m: &DMatrix<f64>) -> EngineResult<DMatrix<f64>> {
    if m.nrows() != m.ncols() {
        return Err(EngineError::BadInput {
            field: "matrix".into(),
            reason: "matrix must be square".into(),
        });
    }
    let eigen = m.clone().symmetric_eigen();
    let n = eigen.eigenvalues.len();
    let mut diag = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        let ev = eigen.eigenvalues[i];
        diag[(i, i)] = if ev > 0.0 { ev.sqrt() } else { 0.0 };
    }
    Ok(&eigen.eigenvectors * &diag)
}

/// Quarter root of an annual transition matrix: `M^(1/4)`, obtained by two
/// successive applications of the principal square root (`sqrt(sqrt(M))`),
/// used to translate an annual rating-transition matrix into the
/// per-quarter transition matrix.
pub fn quarter_root(m: &DMatrix<f64>) -> EngineResult<DMatrix<f64>> {
    let half = pseudo_sqrt(m)?;
    let gram = &half * half.transpose();
    pseudo_sqrt(&gram)
}
