// crates/fb_mules/src/parallel/halo.rs

//! 光环交换与全局归约
//!
//! 限制器在处理跨进程面之前必须拿到相邻进程的单元值和面值。
//! [`HaloExchange::exchange`] 是阻塞操作：本进程先向每个进程边界 patch
//! 的对端发送数据，再按 patch 顺序逐一接收，全部收齐后才返回。
//!
//! # 实现
//!
//! - [`SerialHalo`]: 单进程，无进程边界，归约即恒等
//! - [`ChannelHalo`]: 进程内多 rank，每对 rank 一条 FIFO 通道（全连接）
//!
//! 通信失败（对端已退出、消息类型或长度不匹配）是致命错误，
//! 以 `FbError::Communication` 上报，不重试。

use std::sync::mpsc::{channel, Receiver, Sender};

use fb_foundation::{FbError, FbResult};

use crate::field::{FaceField, PatchValues};
use crate::mesh::FvMesh;

/// 光环交换接口
///
/// 所有 rank 必须以相同顺序调用交换与归约操作。
pub trait HaloExchange {
    /// 本进程号
    fn rank(&self) -> usize;

    /// 进程总数
    fn n_ranks(&self) -> usize;

    /// 按进程边界 patch 交换数据
    ///
    /// `send[p]` 为第 `p` 个 patch 待发送的逐面值，物理 patch 的条目被忽略。
    /// 返回每个 patch 接收到的对端值，物理 patch 为空向量。
    fn exchange(&self, mesh: &FvMesh, send: &[Vec<f64>]) -> FbResult<PatchValues>;

    /// 全局求和
    fn all_reduce_sum(&self, value: f64) -> FbResult<f64>;

    /// 全局最小值
    fn all_reduce_min(&self, value: f64) -> FbResult<f64>;

    /// 全局最大值
    fn all_reduce_max(&self, value: f64) -> FbResult<f64>;

    /// 是否多进程
    fn is_parallel(&self) -> bool {
        self.n_ranks() > 1
    }

    /// 交换进程边界面所属单元的值，返回对端单元值
    fn exchange_cells(&self, mesh: &FvMesh, cells: &[f64]) -> FbResult<PatchValues> {
        let send: PatchValues = mesh
            .patches()
            .iter()
            .map(|p| {
                if p.is_coupled() {
                    p.face_cells().iter().map(|&c| cells[c]).collect()
                } else {
                    Vec::new()
                }
            })
            .collect();
        self.exchange(mesh, &send)
    }

    /// 交换进程边界面上的面值
    fn exchange_faces(&self, mesh: &FvMesh, field: &FaceField) -> FbResult<PatchValues> {
        let send: PatchValues = mesh
            .patches()
            .iter()
            .zip(&field.patches)
            .map(|(p, values)| {
                if p.is_coupled() {
                    values.clone()
                } else {
                    Vec::new()
                }
            })
            .collect();
        self.exchange(mesh, &send)
    }
}

// ============================================================
// 单进程
// ============================================================

/// 单进程光环（无通信）
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialHalo;

impl HaloExchange for SerialHalo {
    fn rank(&self) -> usize {
        0
    }

    fn n_ranks(&self) -> usize {
        1
    }

    fn exchange(&self, mesh: &FvMesh, _send: &[Vec<f64>]) -> FbResult<PatchValues> {
        if let Some(p) = mesh.patches().iter().find(|p| p.is_coupled()) {
            return Err(FbError::communication(
                0,
                format!("单进程光环无法处理进程边界 '{}'", p.name()),
            ));
        }
        Ok(vec![Vec::new(); mesh.patches().len()])
    }

    fn all_reduce_sum(&self, value: f64) -> FbResult<f64> {
        Ok(value)
    }

    fn all_reduce_min(&self, value: f64) -> FbResult<f64> {
        Ok(value)
    }

    fn all_reduce_max(&self, value: f64) -> FbResult<f64> {
        Ok(value)
    }
}

// ============================================================
// 进程内多 rank
// ============================================================

/// 通道消息
#[derive(Debug)]
enum HaloMessage {
    Field(Vec<f64>),
    Scalar(f64),
}

/// 基于 `std::sync::mpsc` 的进程内多 rank 光环
///
/// 每个有序 rank 对 `(i, j)` 一条无界通道，发送不阻塞，接收阻塞。
pub struct ChannelHalo {
    rank: usize,
    n_ranks: usize,
    senders: Vec<Option<Sender<HaloMessage>>>,
    receivers: Vec<Option<Receiver<HaloMessage>>>,
}

impl ChannelHalo {
    /// 创建 `n_ranks` 个相互连通的光环端点，按 rank 顺序返回
    pub fn network(n_ranks: usize) -> Vec<ChannelHalo> {
        let mut halos: Vec<ChannelHalo> = (0..n_ranks)
            .map(|rank| ChannelHalo {
                rank,
                n_ranks,
                senders: (0..n_ranks).map(|_| None).collect(),
                receivers: (0..n_ranks).map(|_| None).collect(),
            })
            .collect();

        for from in 0..n_ranks {
            for to in 0..n_ranks {
                if from != to {
                    let (tx, rx) = channel();
                    halos[from].senders[to] = Some(tx);
                    halos[to].receivers[from] = Some(rx);
                }
            }
        }
        halos
    }

    fn send(&self, to: usize, message: HaloMessage) -> FbResult<()> {
        let sender = self
            .senders
            .get(to)
            .and_then(Option::as_ref)
            .ok_or_else(|| FbError::communication(self.rank, format!("无到 rank {} 的通道", to)))?;
        sender.send(message).map_err(|_| {
            FbError::communication(self.rank, format!("rank {} 已断开", to))
        })
    }

    fn recv(&self, from: usize) -> FbResult<HaloMessage> {
        let receiver = self
            .receivers
            .get(from)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                FbError::communication(self.rank, format!("无来自 rank {} 的通道", from))
            })?;
        receiver.recv().map_err(|_| {
            FbError::communication(self.rank, format!("rank {} 已断开", from))
        })
    }

    fn all_reduce(&self, value: f64, op: fn(f64, f64) -> f64) -> FbResult<f64> {
        for peer in (0..self.n_ranks).filter(|&r| r != self.rank) {
            self.send(peer, HaloMessage::Scalar(value))?;
        }

        let mut values = vec![0.0; self.n_ranks];
        values[self.rank] = value;
        for peer in (0..self.n_ranks).filter(|&r| r != self.rank) {
            match self.recv(peer)? {
                HaloMessage::Scalar(v) => values[peer] = v,
                HaloMessage::Field(_) => {
                    return Err(FbError::communication(
                        self.rank,
                        format!("归约期间收到来自 rank {} 的场消息", peer),
                    ))
                }
            }
        }

        // 按 rank 顺序合并，所有进程得到逐位相同的结果
        Ok(values.into_iter().reduce(op).unwrap_or(value))
    }
}

impl HaloExchange for ChannelHalo {
    fn rank(&self) -> usize {
        self.rank
    }

    fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    fn exchange(&self, mesh: &FvMesh, send: &[Vec<f64>]) -> FbResult<PatchValues> {
        FbError::check_size("halo_send", mesh.patches().len(), send.len())?;

        for (patch, values) in mesh.patches().iter().zip(send) {
            if let Some(nbr) = patch.neighbour_rank() {
                FbError::check_size("halo_send", patch.size(), values.len())?;
                self.send(nbr, HaloMessage::Field(values.clone()))?;
            }
        }

        let mut received = Vec::with_capacity(mesh.patches().len());
        for patch in mesh.patches() {
            let Some(nbr) = patch.neighbour_rank() else {
                received.push(Vec::new());
                continue;
            };
            match self.recv(nbr)? {
                HaloMessage::Field(values) if values.len() == patch.size() => received.push(values),
                HaloMessage::Field(values) => {
                    return Err(FbError::communication(
                        self.rank,
                        format!(
                            "patch '{}' 期望 {} 个值, 收到 {}",
                            patch.name(),
                            patch.size(),
                            values.len()
                        ),
                    ))
                }
                HaloMessage::Scalar(_) => {
                    return Err(FbError::communication(
                        self.rank,
                        format!("patch '{}' 交换期间收到标量消息", patch.name()),
                    ))
                }
            }
        }

        log::trace!("rank {} 光环交换完成", self.rank);
        Ok(received)
    }

    fn all_reduce_sum(&self, value: f64) -> FbResult<f64> {
        self.all_reduce(value, |a, b| a + b)
    }

    fn all_reduce_min(&self, value: f64) -> FbResult<f64> {
        self.all_reduce(value, f64::min)
    }

    fn all_reduce_max(&self, value: f64) -> FbResult<f64> {
        self.all_reduce(value, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Patch;
    use std::thread;

    fn proc_mesh(rank: usize) -> FvMesh {
        let nbr = 1 - rank;
        FvMesh::new(
            vec![1.0, 1.0],
            vec![0],
            vec![1],
            vec![Patch::processor(
                format!("procBoundary{}to{}", rank, nbr),
                nbr,
                vec![rank],
            )],
        )
        .unwrap()
    }

    #[test]
    fn test_serial_halo() {
        let halo = SerialHalo;
        assert_eq!(halo.all_reduce_sum(2.5).unwrap(), 2.5);
        assert!(!halo.is_parallel());
        assert!(halo.exchange_cells(&proc_mesh(0), &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_channel_exchange_and_reduce() {
        let halos = ChannelHalo::network(2);
        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = halos
                .into_iter()
                .map(|halo| {
                    s.spawn(move || {
                        let mesh = proc_mesh(halo.rank());
                        let cells = vec![10.0 * halo.rank() as f64, 10.0 * halo.rank() as f64 + 1.0];
                        let recv = halo.exchange_cells(&mesh, &cells).unwrap();
                        let sum = halo.all_reduce_sum(halo.rank() as f64 + 1.0).unwrap();
                        let max = halo.all_reduce_max(halo.rank() as f64).unwrap();
                        (recv, sum, max)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        // rank 0 发送单元 0 的值，rank 1 发送单元 1 的值
        assert_eq!(results[0].0[0], vec![11.0]);
        assert_eq!(results[1].0[0], vec![0.0]);
        assert_eq!(results[0].1, 3.0);
        assert_eq!(results[1].1, 3.0);
        assert_eq!(results[0].2, 1.0);
    }

    #[test]
    fn test_dropped_peer_is_communication_error() {
        let mut halos = ChannelHalo::network(2);
        let survivor = halos.remove(0);
        drop(halos);
        let err = survivor.all_reduce_sum(1.0).unwrap_err();
        assert!(err.is_communication());
    }
}
