// crates/fb_mules/src/field/boundary.rs

//! 单元场的边界条件
//!
//! 每个物理 patch 一个 [`BoundaryCondition`]。进程边界 patch 的条件被忽略，
//! 其边界值总是通过光环交换取相邻进程的单元值。

use fb_foundation::{FbError, FbResult};

use crate::mesh::FvMesh;
use crate::parallel::HaloExchange;

/// 每个 patch 的边界面值
pub type PatchValues = Vec<Vec<f64>>;

/// 单个 patch 的边界条件
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryCondition {
    /// 逐面给定值
    FixedValue(Vec<f64>),
    /// 均匀给定值
    Uniform(f64),
    /// 零梯度，边界值等于所属单元值
    ZeroGradient,
}

impl BoundaryCondition {
    /// 是否固定边界值
    pub fn fixes_value(&self) -> bool {
        !matches!(self, Self::ZeroGradient)
    }
}

/// 全部 patch 的边界条件
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryConditions {
    conditions: Vec<BoundaryCondition>,
}

impl BoundaryConditions {
    /// 所有 patch 零梯度
    pub fn zero_gradient(mesh: &FvMesh) -> Self {
        Self {
            conditions: vec![BoundaryCondition::ZeroGradient; mesh.patches().len()],
        }
    }

    /// 直接给定，数量须与 patch 数一致
    pub fn new(mesh: &FvMesh, conditions: Vec<BoundaryCondition>) -> FbResult<Self> {
        let bcs = Self { conditions };
        bcs.validate(mesh)?;
        Ok(bcs)
    }

    /// 设置第 `patch` 个 patch 的条件
    pub fn set(&mut self, patch: usize, condition: BoundaryCondition) -> FbResult<()> {
        let slot = self
            .conditions
            .get_mut(patch)
            .ok_or_else(|| FbError::invalid_input(format!("patch 索引越界: {}", patch)))?;
        *slot = condition;
        Ok(())
    }

    /// 按 patch 名称设置条件
    pub fn set_by_name(
        &mut self,
        mesh: &FvMesh,
        name: &str,
        condition: BoundaryCondition,
    ) -> FbResult<()> {
        let patch = mesh
            .patch_index(name)
            .ok_or_else(|| FbError::invalid_input(format!("未知 patch '{}'", name)))?;
        self.set(patch, condition)
    }

    /// 第 `patch` 个条件
    pub fn get(&self, patch: usize) -> Option<&BoundaryCondition> {
        self.conditions.get(patch)
    }

    /// 全部条件
    pub fn conditions(&self) -> &[BoundaryCondition] {
        &self.conditions
    }

    /// 第 `patch` 个物理 patch 是否固定边界值
    pub fn fixes_value(&self, patch: usize) -> bool {
        self.conditions
            .get(patch)
            .map_or(false, BoundaryCondition::fixes_value)
    }

    /// 检查条件数量与定值长度
    pub fn validate(&self, mesh: &FvMesh) -> FbResult<()> {
        FbError::check_size("boundary_conditions", mesh.patches().len(), self.conditions.len())?;
        for (bc, patch) in self.conditions.iter().zip(mesh.patches()) {
            if let BoundaryCondition::FixedValue(values) = bc {
                if !patch.is_coupled() {
                    FbError::check_size("fixed_value", patch.size(), values.len())?;
                }
            }
        }
        Ok(())
    }

    /// 计算每个 patch 的边界面值
    ///
    /// 物理 patch 按边界条件求值；进程边界 patch 通过 `halo`
    /// 阻塞交换，得到相邻进程对应单元的值。
    pub fn evaluate<H: HaloExchange + ?Sized>(
        &self,
        mesh: &FvMesh,
        psi: &[f64],
        halo: &H,
    ) -> FbResult<PatchValues> {
        FbError::check_size("psi", mesh.n_cells(), psi.len())?;
        self.validate(mesh)?;

        let mut values: PatchValues = mesh
            .patches()
            .iter()
            .zip(&self.conditions)
            .map(|(patch, bc)| {
                if patch.is_coupled() {
                    return Vec::new();
                }
                match bc {
                    BoundaryCondition::FixedValue(v) => v.clone(),
                    BoundaryCondition::Uniform(v) => vec![*v; patch.size()],
                    BoundaryCondition::ZeroGradient => {
                        patch.face_cells().iter().map(|&c| psi[c]).collect()
                    }
                }
            })
            .collect();

        if mesh.is_parallel() {
            let received = halo.exchange_cells(mesh, psi)?;
            for ((slot, recv), patch) in values.iter_mut().zip(received).zip(mesh.patches()) {
                if patch.is_coupled() {
                    *slot = recv;
                }
            }
        }

        Ok(values)
    }
}
