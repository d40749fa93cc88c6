// crates/fb_mules/src/parallel/decompose.rs

//! 区域分解
//!
//! 按单元归属把全局网格切成若干子域。被切开的内部面在两侧子域中
//! 各成为一个进程边界面，本地单元总是 owner；若本地单元原本是全局
//! neighbour，该面标记为翻转，面通量取反。
//!
//! 进程边界 patch 每个相邻 rank 一个，按相邻 rank 升序排列，
//! patch 内的面按全局面索引排序，两侧顺序因此一致。

use std::collections::BTreeMap;
use std::thread;

use fb_foundation::{ensure, FbError, FbResult};

use super::halo::ChannelHalo;
use crate::field::{BoundaryCondition, BoundaryConditions, FaceField};
use crate::mesh::{FvMesh, Patch};

/// 本地面在全局网格中的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceSource {
    /// 全局内部面；`flip` 表示本地 owner 为全局 neighbour
    Internal {
        /// 全局内部面索引
        face: usize,
        /// 是否翻转方向
        flip: bool,
    },
    /// 全局物理边界面
    Boundary {
        /// 全局 patch 索引
        patch: usize,
        /// patch 内面序号
        index: usize,
    },
}

/// 子域
#[derive(Debug, Clone)]
pub struct SubDomain {
    rank: usize,
    n_ranks: usize,
    mesh: FvMesh,
    cell_map: Vec<usize>,
    internal_sources: Vec<usize>,
    patch_sources: Vec<Vec<FaceSource>>,
    n_global_patches: usize,
}

impl SubDomain {
    /// 进程号
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// 进程总数
    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    /// 本地网格
    pub fn mesh(&self) -> &FvMesh {
        &self.mesh
    }

    /// 本地单元到全局单元的映射
    pub fn cell_map(&self) -> &[usize] {
        &self.cell_map
    }

    /// 第 `patch` 个本地 patch 各面的来源
    pub fn patch_sources(&self, patch: usize) -> &[FaceSource] {
        &self.patch_sources[patch]
    }

    /// 提取本地单元值
    pub fn scatter_cells(&self, global: &[f64]) -> Vec<f64> {
        self.cell_map.iter().map(|&c| global[c]).collect()
    }

    /// 提取本地面通量，翻转面取反
    pub fn scatter_faces(&self, global: &FaceField) -> FaceField {
        let internal = self
            .internal_sources
            .iter()
            .map(|&f| global.internal[f])
            .collect();
        let patches = self
            .patch_sources
            .iter()
            .map(|sources| {
                sources
                    .iter()
                    .map(|src| match *src {
                        FaceSource::Internal { face, flip } => {
                            if flip {
                                -global.internal[face]
                            } else {
                                global.internal[face]
                            }
                        }
                        FaceSource::Boundary { patch, index } => global.patches[patch][index],
                    })
                    .collect()
            })
            .collect();
        FaceField::new(internal, patches)
    }

    /// 提取本地边界条件，进程边界 patch 置为零梯度占位
    pub fn scatter_boundary_conditions(
        &self,
        global: &BoundaryConditions,
    ) -> FbResult<BoundaryConditions> {
        FbError::check_size(
            "boundary_conditions",
            self.n_global_patches,
            global.conditions().len(),
        )?;

        let conditions = self
            .mesh
            .patches()
            .iter()
            .enumerate()
            .map(|(p, patch)| {
                if patch.is_coupled() {
                    return BoundaryCondition::ZeroGradient;
                }
                match &global.conditions()[p] {
                    BoundaryCondition::FixedValue(values) => BoundaryCondition::FixedValue(
                        self.patch_sources[p]
                            .iter()
                            .map(|src| match *src {
                                FaceSource::Boundary { index, .. } => values[index],
                                FaceSource::Internal { .. } => 0.0,
                            })
                            .collect(),
                    ),
                    other => other.clone(),
                }
            })
            .collect();
        BoundaryConditions::new(&self.mesh, conditions)
    }
}

/// 按逐单元 rank 分解
///
/// # 错误
/// - `cell_rank` 长度不匹配
/// - 某个 rank 没有单元
pub fn decompose(mesh: &FvMesh, cell_rank: &[usize]) -> FbResult<Vec<SubDomain>> {
    FbError::check_size("cell_rank", mesh.n_cells(), cell_rank.len())?;
    ensure!(
        !mesh.is_parallel(),
        FbError::invalid_input("只能分解不含进程边界的全局网格")
    );

    let n_ranks = cell_rank.iter().copied().max().map_or(0, |m| m + 1);
    let mut local_index = vec![0usize; mesh.n_cells()];
    let mut cell_maps: Vec<Vec<usize>> = vec![Vec::new(); n_ranks];
    for (c, &r) in cell_rank.iter().enumerate() {
        local_index[c] = cell_maps[r].len();
        cell_maps[r].push(c);
    }
    if let Some(r) = cell_maps.iter().position(Vec::is_empty) {
        return Err(FbError::invalid_input(format!("rank {} 没有分配到单元", r)));
    }

    let mut subdomains = Vec::with_capacity(n_ranks);
    for (rank, cell_map) in cell_maps.into_iter().enumerate() {
        let mut owner = Vec::new();
        let mut neighbour = Vec::new();
        let mut internal_sources = Vec::new();
        // 相邻 rank -> (本地单元, 来源)
        let mut proc_faces: BTreeMap<usize, Vec<(usize, FaceSource)>> = BTreeMap::new();

        for (f, (&o, &n)) in mesh.owner().iter().zip(mesh.neighbour()).enumerate() {
            match (cell_rank[o] == rank, cell_rank[n] == rank) {
                (true, true) => {
                    owner.push(local_index[o]);
                    neighbour.push(local_index[n]);
                    internal_sources.push(f);
                }
                (true, false) => proc_faces
                    .entry(cell_rank[n])
                    .or_default()
                    .push((local_index[o], FaceSource::Internal { face: f, flip: false })),
                (false, true) => proc_faces
                    .entry(cell_rank[o])
                    .or_default()
                    .push((local_index[n], FaceSource::Internal { face: f, flip: true })),
                (false, false) => {}
            }
        }

        let mut patches = Vec::new();
        let mut patch_sources = Vec::new();
        for (p, patch) in mesh.patches().iter().enumerate() {
            let mut face_cells = Vec::new();
            let mut sources = Vec::new();
            for (k, &c) in patch.face_cells().iter().enumerate() {
                if cell_rank[c] == rank {
                    face_cells.push(local_index[c]);
                    sources.push(FaceSource::Boundary { patch: p, index: k });
                }
            }
            patches.push(Patch::new(patch.name(), face_cells));
            patch_sources.push(sources);
        }
        for (nbr, faces) in proc_faces {
            let (face_cells, sources): (Vec<_>, Vec<_>) = faces.into_iter().unzip();
            patches.push(Patch::processor(
                format!("procBoundary{}to{}", rank, nbr),
                nbr,
                face_cells,
            ));
            patch_sources.push(sources);
        }

        let volumes = cell_map.iter().map(|&c| mesh.volumes()[c]).collect();
        let local_mesh = FvMesh::new(volumes, owner, neighbour, patches)?;
        log::debug!(
            "rank {}: {} 单元, {} 内部面, {} 个进程边界",
            rank,
            local_mesh.n_cells(),
            local_mesh.n_internal_faces(),
            local_mesh.patches().iter().filter(|p| p.is_coupled()).count()
        );

        subdomains.push(SubDomain {
            rank,
            n_ranks,
            mesh: local_mesh,
            cell_map,
            internal_sources,
            patch_sources,
            n_global_patches: mesh.patches().len(),
        });
    }

    Ok(subdomains)
}

/// 按连续单元块分解为 `n_ranks` 个子域
pub fn decompose_blocks(mesh: &FvMesh, n_ranks: usize) -> FbResult<Vec<SubDomain>> {
    ensure!(
        n_ranks >= 1 && n_ranks <= mesh.n_cells(),
        FbError::invalid_input(format!(
            "进程数 {} 必须在 1..={} 范围内",
            n_ranks,
            mesh.n_cells()
        ))
    );
    let n = mesh.n_cells();
    let cell_rank: Vec<usize> = (0..n).map(|c| c * n_ranks / n).collect();
    decompose(mesh, &cell_rank)
}

/// 汇总各子域的单元值
pub fn gather_cells(subdomains: &[SubDomain], parts: &[Vec<f64>], n_cells: usize) -> FbResult<Vec<f64>> {
    FbError::check_size("gather_parts", subdomains.len(), parts.len())?;
    let mut global = vec![0.0; n_cells];
    for (sd, part) in subdomains.iter().zip(parts) {
        FbError::check_size("gather_cells", sd.cell_map.len(), part.len())?;
        for (&g, &v) in sd.cell_map.iter().zip(part) {
            global[g] = v;
        }
    }
    Ok(global)
}

/// 汇总各子域的面通量
///
/// 切开的面取全局 owner 所在一侧（未翻转）的值。
pub fn gather_faces(
    subdomains: &[SubDomain],
    parts: &[FaceField],
    global_mesh: &FvMesh,
) -> FbResult<FaceField> {
    FbError::check_size("gather_parts", subdomains.len(), parts.len())?;
    let mut global = FaceField::zeros(global_mesh);
    for (sd, part) in subdomains.iter().zip(parts) {
        part.check_layout(&sd.mesh, "gather_faces")?;
        for (&f, &v) in sd.internal_sources.iter().zip(&part.internal) {
            global.internal[f] = v;
        }
        for (sources, values) in sd.patch_sources.iter().zip(&part.patches) {
            for (src, &v) in sources.iter().zip(values) {
                match *src {
                    FaceSource::Internal { face, flip: false } => global.internal[face] = v,
                    FaceSource::Internal { flip: true, .. } => {}
                    FaceSource::Boundary { patch, index } => global.patches[patch][index] = v,
                }
            }
        }
    }
    Ok(global)
}

/// 每个子域一个作用域线程，并行执行 `f(子域, 光环)`
///
/// 结果按 rank 顺序返回。若有 rank 失败，优先返回非通信错误，
/// 其余 rank 因对端退出而产生的通信错误被视为连带失败。
pub fn run_decomposed<T, F>(subdomains: &[SubDomain], f: F) -> FbResult<Vec<T>>
where
    T: Send,
    F: Fn(&SubDomain, ChannelHalo) -> FbResult<T> + Sync,
{
    let halos = ChannelHalo::network(subdomains.len());
    let f = &f;
    let results: Vec<FbResult<T>> = thread::scope(|s| {
        let handles: Vec<_> = subdomains
            .iter()
            .zip(halos)
            .map(|(sd, halo)| s.spawn(move || f(sd, halo)))
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, h)| {
                h.join().unwrap_or_else(|_| {
                    Err(FbError::internal(format!("rank {} 线程 panic", rank)))
                })
            })
            .collect()
    });

    let mut values = Vec::with_capacity(results.len());
    let mut first_comm_error = None;
    for result in results {
        match result {
            Ok(v) => values.push(v),
            Err(e) if e.is_communication() => {
                first_comm_error.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }
    match first_comm_error {
        Some(e) => Err(e),
        None => Ok(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{line_1d, line_flux, StructuredGrid};
    use crate::parallel::HaloExchange;

    #[test]
    fn test_decompose_line() {
        let mesh = line_1d(6, 1.0).unwrap();
        let subs = decompose_blocks(&mesh, 2).unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].cell_map(), &[0, 1, 2]);
        assert_eq!(subs[1].cell_map(), &[3, 4, 5]);

        let m0 = subs[0].mesh();
        assert_eq!(m0.n_internal_faces(), 2);
        // left, right(空), procBoundary0to1
        assert_eq!(m0.patches().len(), 3);
        assert_eq!(m0.patches()[1].size(), 0);
        assert_eq!(m0.patches()[2].neighbour_rank(), Some(1));
        assert_eq!(m0.patches()[2].face_cells(), &[2]);

        let m1 = subs[1].mesh();
        assert_eq!(m1.patches()[2].face_cells(), &[0]);
        assert_eq!(
            subs[1].patch_sources(2),
            &[FaceSource::Internal { face: 2, flip: true }]
        );
    }

    #[test]
    fn test_scatter_faces_flips_sign() {
        let mesh = line_1d(4, 1.0).unwrap();
        let phi = line_flux(&mesh, 1.0);
        let subs = decompose_blocks(&mesh, 2).unwrap();
        let local0 = subs[0].scatter_faces(&phi);
        let local1 = subs[1].scatter_faces(&phi);
        assert_eq!(local0.patches[2], vec![1.0]);
        assert_eq!(local1.patches[2], vec![-1.0]);

        let back = gather_faces(&subs, &[local0, local1], &mesh).unwrap();
        assert_eq!(back, phi);
    }

    #[test]
    fn test_gather_cells_roundtrip() {
        let grid = StructuredGrid::new(4, 3, 1.0, 1.0).unwrap();
        let mesh = grid.mesh();
        let cell_rank: Vec<usize> = (0..12).map(|c| (c % 4) / 2).collect();
        let subs = decompose(mesh, &cell_rank).unwrap();
        let global: Vec<f64> = (0..12).map(|c| c as f64).collect();
        let parts: Vec<_> = subs.iter().map(|s| s.scatter_cells(&global)).collect();
        assert_eq!(gather_cells(&subs, &parts, 12).unwrap(), global);
        // 每个子域一个进程边界 patch，3 个面
        for sd in &subs {
            let procs: Vec<_> = sd.mesh().patches().iter().filter(|p| p.is_coupled()).collect();
            assert_eq!(procs.len(), 1);
            assert_eq!(procs[0].size(), 3);
        }
    }

    #[test]
    fn test_scatter_fixed_value_condition() {
        let grid = StructuredGrid::new(2, 2, 1.0, 1.0).unwrap();
        let mesh = grid.mesh();
        let mut bcs = BoundaryConditions::zero_gradient(mesh);
        bcs.set_by_name(mesh, "bottom", BoundaryCondition::FixedValue(vec![0.1, 0.2]))
            .unwrap();
        let subs = decompose(mesh, &[0, 1, 0, 1]).unwrap();
        let local = subs[1].scatter_boundary_conditions(&bcs).unwrap();
        assert_eq!(
            local.get(2),
            Some(&BoundaryCondition::FixedValue(vec![0.2]))
        );
    }

    #[test]
    fn test_decompose_rejects_empty_rank() {
        let mesh = line_1d(3, 1.0).unwrap();
        assert!(decompose(&mesh, &[0, 0, 2]).is_err());
        assert!(decompose_blocks(&mesh, 4).is_err());
    }

    #[test]
    fn test_run_decomposed_reduces() {
        let mesh = line_1d(8, 1.0).unwrap();
        let subs = decompose_blocks(&mesh, 4).unwrap();
        let totals = run_decomposed(&subs, |sd, halo| {
            halo.all_reduce_sum(sd.mesh().total_volume())
        })
        .unwrap();
        assert!(totals.iter().all(|&t| (t - 8.0).abs() < 1e-12));
    }

    #[test]
    fn test_run_decomposed_prefers_root_cause() {
        let mesh = line_1d(4, 1.0).unwrap();
        let subs = decompose_blocks(&mesh, 2).unwrap();
        let result: FbResult<Vec<f64>> = run_decomposed(&subs, |sd, halo| {
            if sd.rank() == 1 {
                return Err(FbError::invalid_input("rank 1 失败"));
            }
            halo.all_reduce_sum(1.0)
        });
        assert!(matches!(result, Err(FbError::InvalidInput { .. })));
    }
}
