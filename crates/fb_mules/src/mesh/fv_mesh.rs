// crates/fb_mules/src/mesh/fv_mesh.rs

//! 有限体积网格连接关系
//!
//! 采用 owner/neighbour 面寻址：
//!
//! - 内部面 `f < n_internal_faces`，`owner[f] != neighbour[f]`，
//!   面通量为正表示从 owner 流向 neighbour
//! - 边界面按 patch 连续编号，位于全部内部面之后，
//!   面通量为正表示流出计算域（流出 owner 单元）
//!
//! 分区并行时，被切开的内部面变为 `PatchKind::Processor` 边界面，
//! 面通量方向同样以本地单元为 owner。

use fb_foundation::validation::{ValidationError, ValidationReport, ValidationWarning};
use fb_foundation::{FbError, FbResult};

/// 边界 patch 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// 物理边界，边界值由场的边界条件给出
    Physical,
    /// 进程间耦合边界，边界值来自相邻进程
    Processor {
        /// 相邻进程号
        neighbour_rank: usize,
    },
}

/// 边界 patch
#[derive(Debug, Clone)]
pub struct Patch {
    name: String,
    start: usize,
    face_cells: Vec<usize>,
    kind: PatchKind,
}

impl Patch {
    /// 创建物理边界 patch
    pub fn new(name: impl Into<String>, face_cells: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            start: 0,
            face_cells,
            kind: PatchKind::Physical,
        }
    }

    /// 创建进程边界 patch
    pub fn processor(name: impl Into<String>, neighbour_rank: usize, face_cells: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            start: 0,
            face_cells,
            kind: PatchKind::Processor { neighbour_rank },
        }
    }

    /// patch 名称
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 第一个面的全局面索引
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// 面数
    #[inline]
    pub fn size(&self) -> usize {
        self.face_cells.len()
    }

    /// 每个面所属的单元
    #[inline]
    pub fn face_cells(&self) -> &[usize] {
        &self.face_cells
    }

    /// patch 类型
    #[inline]
    pub fn kind(&self) -> PatchKind {
        self.kind
    }

    /// 是否为进程间耦合边界
    #[inline]
    pub fn is_coupled(&self) -> bool {
        matches!(self.kind, PatchKind::Processor { .. })
    }

    /// 相邻进程号（仅进程边界）
    #[inline]
    pub fn neighbour_rank(&self) -> Option<usize> {
        match self.kind {
            PatchKind::Processor { neighbour_rank } => Some(neighbour_rank),
            PatchKind::Physical => None,
        }
    }
}

/// 非结构化有限体积网格（只读）
#[derive(Debug, Clone)]
pub struct FvMesh {
    volumes: Vec<f64>,
    owner: Vec<usize>,
    neighbour: Vec<usize>,
    patches: Vec<Patch>,
}

impl FvMesh {
    /// 创建网格并验证全部不变量
    ///
    /// # 参数
    /// - `volumes`: 单元体积，必须为正的有限值
    /// - `owner`/`neighbour`: 内部面两侧单元
    /// - `patches`: 边界 patch，按给定顺序连续编号
    ///
    /// # 错误
    /// 任一不变量不满足时返回 `FbError::InvalidMesh`
    pub fn new(
        volumes: Vec<f64>,
        owner: Vec<usize>,
        neighbour: Vec<usize>,
        mut patches: Vec<Patch>,
    ) -> FbResult<Self> {
        FbError::check_size("neighbour", owner.len(), neighbour.len())?;

        let mut start = owner.len();
        for patch in &mut patches {
            patch.start = start;
            start += patch.size();
        }

        let mesh = Self {
            volumes,
            owner,
            neighbour,
            patches,
        };

        let report = mesh.validate();
        if report.has_errors() {
            return Err(FbError::invalid_mesh(report.to_string()));
        }
        for warning in &report.warnings {
            log::warn!("网格检查: {}", warning);
        }
        Ok(mesh)
    }

    /// 检查网格不变量
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();
        let n_cells = self.n_cells();

        if n_cells == 0 {
            report.add_error(ValidationError::TopologyError {
                message: "网格不含单元".into(),
                element_id: None,
            });
            return report;
        }

        for (c, &v) in self.volumes.iter().enumerate() {
            if !v.is_finite() {
                report.add_error(ValidationError::NonFinite {
                    field: "volume",
                    cell_id: c,
                    value: v,
                });
            } else if v <= 0.0 {
                report.add_error(ValidationError::OutOfRange {
                    field: "volume",
                    cell_id: c,
                    value: v,
                    min: 0.0,
                    max: f64::MAX,
                });
            }
        }

        let mut n_cell_faces = vec![0usize; n_cells];
        for (f, (&o, &n)) in self.owner.iter().zip(&self.neighbour).enumerate() {
            if o >= n_cells || n >= n_cells {
                report.add_error(ValidationError::TopologyError {
                    message: format!("内部面单元索引越界 ({}, {})", o, n),
                    element_id: Some(f),
                });
                continue;
            }
            if o == n {
                report.add_error(ValidationError::TopologyError {
                    message: format!("内部面两侧为同一单元 {}", o),
                    element_id: Some(f),
                });
            }
            n_cell_faces[o] += 1;
            n_cell_faces[n] += 1;
        }

        for (i, patch) in self.patches.iter().enumerate() {
            if self.patches[..i].iter().any(|p| p.name == patch.name) {
                report.add_error(ValidationError::TopologyError {
                    message: format!("重复的 patch 名称 '{}'", patch.name),
                    element_id: None,
                });
            }
            for (k, &c) in patch.face_cells.iter().enumerate() {
                if c >= n_cells {
                    report.add_error(ValidationError::TopologyError {
                        message: format!("patch '{}' 面所属单元 {} 越界", patch.name, c),
                        element_id: Some(patch.start + k),
                    });
                } else {
                    n_cell_faces[c] += 1;
                }
            }
        }

        for (c, &n) in n_cell_faces.iter().enumerate() {
            if n == 0 {
                report.add_warning(ValidationWarning::QualityWarning {
                    message: "孤立单元（无任何面）".into(),
                    element_id: Some(c),
                });
            }
        }

        report
    }

    /// 单元数
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.volumes.len()
    }

    /// 内部面数
    #[inline]
    pub fn n_internal_faces(&self) -> usize {
        self.owner.len()
    }

    /// 边界面数
    #[inline]
    pub fn n_boundary_faces(&self) -> usize {
        self.patches.iter().map(Patch::size).sum()
    }

    /// 总面数
    #[inline]
    pub fn n_faces(&self) -> usize {
        self.n_internal_faces() + self.n_boundary_faces()
    }

    /// 单元体积
    #[inline]
    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }

    /// 内部面 owner
    #[inline]
    pub fn owner(&self) -> &[usize] {
        &self.owner
    }

    /// 内部面 neighbour
    #[inline]
    pub fn neighbour(&self) -> &[usize] {
        &self.neighbour
    }

    /// 全部边界 patch
    #[inline]
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// 按名称查找 patch 索引
    pub fn patch_index(&self, name: &str) -> Option<usize> {
        self.patches.iter().position(|p| p.name == name)
    }

    /// 按名称获取 patch
    pub fn patch_by_name(&self, name: &str) -> Option<&Patch> {
        self.patches.iter().find(|p| p.name == name)
    }

    /// 是否含进程边界
    pub fn is_parallel(&self) -> bool {
        self.patches.iter().any(Patch::is_coupled)
    }

    /// 总体积
    pub fn total_volume(&self) -> f64 {
        fb_foundation::KahanSum::sum_iter(self.volumes.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_cells() -> FvMesh {
        FvMesh::new(
            vec![1.0, 2.0],
            vec![0],
            vec![1],
            vec![Patch::new("left", vec![0]), Patch::new("right", vec![1])],
        )
        .unwrap()
    }

    #[test]
    fn test_counts_and_starts() {
        let mesh = two_cells();
        assert_eq!(mesh.n_cells(), 2);
        assert_eq!(mesh.n_internal_faces(), 1);
        assert_eq!(mesh.n_boundary_faces(), 2);
        assert_eq!(mesh.n_faces(), 3);
        assert_eq!(mesh.patches()[0].start(), 1);
        assert_eq!(mesh.patches()[1].start(), 2);
        assert_eq!(mesh.patch_index("right"), Some(1));
        assert!(!mesh.is_parallel());
        assert!((mesh.total_volume() - 3.0).abs() < 1e-15);
    }

    #[test]
    fn test_rejects_zero_volume() {
        let err = FvMesh::new(vec![1.0, 0.0], vec![0], vec![1], vec![]).unwrap_err();
        assert!(matches!(err, FbError::InvalidMesh { .. }));
    }

    #[test]
    fn test_rejects_self_face() {
        assert!(FvMesh::new(vec![1.0, 1.0], vec![1], vec![1], vec![]).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_face() {
        assert!(FvMesh::new(vec![1.0, 1.0], vec![0], vec![2], vec![]).is_err());
        assert!(FvMesh::new(vec![1.0], vec![], vec![], vec![Patch::new("p", vec![3])]).is_err());
    }

    #[test]
    fn test_rejects_duplicate_patch_names() {
        let err = FvMesh::new(
            vec![1.0, 1.0],
            vec![0],
            vec![1],
            vec![Patch::new("p", vec![0]), Patch::new("p", vec![1])],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_processor_patch() {
        let mesh = FvMesh::new(
            vec![1.0],
            vec![],
            vec![],
            vec![Patch::processor("procBoundary0to1", 1, vec![0])],
        )
        .unwrap();
        assert!(mesh.is_parallel());
        assert_eq!(mesh.patches()[0].neighbour_rank(), Some(1));
    }
}
