// crates/fb_mules/src/mesh/structured.rs

//! 结构化网格生成
//!
//! - [`line_1d`]: 一维等距线网格，patch `left`/`right`
//! - [`StructuredGrid`]: 二维矩形网格，patch `left`/`right`/`bottom`/`top`
//!
//! 单元深度取 1，面积即面长度。

use fb_foundation::{ensure, FbError, FbResult};

use super::fv_mesh::{FvMesh, Patch};
use crate::field::FaceField;

/// 一维线网格
///
/// 单元 `c` 覆盖 `[c·dx, (c+1)·dx]`，内部面 `f` 连接 `f` 与 `f+1`。
pub fn line_1d(n_cells: usize, dx: f64) -> FbResult<FvMesh> {
    ensure!(n_cells > 0, FbError::invalid_input("单元数必须为正"));
    ensure!(
        dx > 0.0 && dx.is_finite(),
        FbError::invalid_input(format!("网格间距必须为正: {}", dx))
    );

    let owner = (0..n_cells - 1).collect();
    let neighbour = (1..n_cells).collect();
    FvMesh::new(
        vec![dx; n_cells],
        owner,
        neighbour,
        vec![
            Patch::new("left", vec![0]),
            Patch::new("right", vec![n_cells - 1]),
        ],
    )
}

/// 一维线网格上的均匀速度通量
///
/// 边界面通量以流出为正：`left` 为 `-u`，`right` 为 `+u`。
pub fn line_flux(mesh: &FvMesh, velocity: f64) -> FaceField {
    let mut phi = FaceField::uniform(mesh, velocity);
    for (values, patch) in phi.patches.iter_mut().zip(mesh.patches()) {
        if patch.name() == "left" {
            values.iter_mut().for_each(|v| *v = -velocity);
        }
    }
    phi
}

/// 二维矩形结构化网格
#[derive(Debug, Clone)]
pub struct StructuredGrid {
    nx: usize,
    ny: usize,
    dx: f64,
    dy: f64,
    mesh: FvMesh,
}

impl StructuredGrid {
    /// 创建 `nx × ny` 网格
    ///
    /// 单元编号 `c = j·nx + i`。内部面先排 x 向面（`(i,j)`→`(i+1,j)`），
    /// 再排 y 向面（`(i,j)`→`(i,j+1)`）。
    pub fn new(nx: usize, ny: usize, dx: f64, dy: f64) -> FbResult<Self> {
        ensure!(nx > 0 && ny > 0, FbError::invalid_input("网格维数必须为正"));
        ensure!(
            dx > 0.0 && dy > 0.0 && dx.is_finite() && dy.is_finite(),
            FbError::invalid_input(format!("网格间距必须为正: dx={}, dy={}", dx, dy))
        );

        let idx = |i: usize, j: usize| j * nx + i;
        let n_internal = (nx - 1) * ny + nx * (ny - 1);
        let mut owner = Vec::with_capacity(n_internal);
        let mut neighbour = Vec::with_capacity(n_internal);

        for j in 0..ny {
            for i in 0..nx - 1 {
                owner.push(idx(i, j));
                neighbour.push(idx(i + 1, j));
            }
        }
        for j in 0..ny - 1 {
            for i in 0..nx {
                owner.push(idx(i, j));
                neighbour.push(idx(i, j + 1));
            }
        }

        let patches = vec![
            Patch::new("left", (0..ny).map(|j| idx(0, j)).collect()),
            Patch::new("right", (0..ny).map(|j| idx(nx - 1, j)).collect()),
            Patch::new("bottom", (0..nx).map(|i| idx(i, 0)).collect()),
            Patch::new("top", (0..nx).map(|i| idx(i, ny - 1)).collect()),
        ];

        let mesh = FvMesh::new(vec![dx * dy; nx * ny], owner, neighbour, patches)?;
        Ok(Self {
            nx,
            ny,
            dx,
            dy,
            mesh,
        })
    }

    /// x 向单元数
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// y 向单元数
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// 网格
    pub fn mesh(&self) -> &FvMesh {
        &self.mesh
    }

    /// 取出网格
    pub fn into_mesh(self) -> FvMesh {
        self.mesh
    }

    /// 单元编号
    #[inline]
    pub fn cell_index(&self, i: usize, j: usize) -> usize {
        j * self.nx + i
    }

    /// 单元中心坐标
    pub fn cell_centre(&self, cell: usize) -> (f64, f64) {
        let i = cell % self.nx;
        let j = cell / self.nx;
        ((i as f64 + 0.5) * self.dx, (j as f64 + 0.5) * self.dy)
    }

    /// 由流函数节点值构造无散面通量
    ///
    /// 速度 `u = ∂ψ/∂y`，`v = -∂ψ/∂x`。面通量为端点流函数之差，
    /// 每个单元的净流出量精确为零（舍入误差内）。
    pub fn stream_function_flux(&self, psi: impl Fn(f64, f64) -> f64) -> FaceField {
        let (nx, ny, dx, dy) = (self.nx, self.ny, self.dx, self.dy);
        let node = |i: usize, j: usize| psi(i as f64 * dx, j as f64 * dy);

        let mut internal = Vec::with_capacity(self.mesh.n_internal_faces());
        for j in 0..ny {
            for i in 0..nx - 1 {
                internal.push(node(i + 1, j + 1) - node(i + 1, j));
            }
        }
        for j in 0..ny - 1 {
            for i in 0..nx {
                internal.push(node(i, j + 1) - node(i + 1, j + 1));
            }
        }

        let left = (0..ny).map(|j| node(0, j) - node(0, j + 1)).collect();
        let right = (0..ny).map(|j| node(nx, j + 1) - node(nx, j)).collect();
        let bottom = (0..nx).map(|i| node(i + 1, 0) - node(i, 0)).collect();
        let top = (0..nx).map(|i| node(i, ny) - node(i + 1, ny)).collect();

        FaceField::new(internal, vec![left, right, bottom, top])
    }

    /// 均匀速度 `(ux, uy)` 的面通量
    pub fn uniform_flux(&self, ux: f64, uy: f64) -> FaceField {
        self.stream_function_flux(|x, y| ux * y - uy * x)
    }
}
