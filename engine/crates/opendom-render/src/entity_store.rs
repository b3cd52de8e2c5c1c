use opendom_scene::{
    dirty_ranges::coalesce_dirty_ranges,
    growable::{GrowableArray, GrowthEvent},
    id_sequence::{InstanceId, InstanceIdSequence},
    instance::Instance,
};

use crate::config::RendererConfig;

/// `vkCmdUpdateBuffer` 单次最多 65536 字节
pub const MAX_UPDATE_BYTES: usize = 65536;
pub const MAX_INSTANCES_PER_UPDATE: usize = MAX_UPDATE_BYTES / size_of::<Instance>();

/// entity definition 在 store 中的下标，在整个进程生命周期内稳定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub usize);

/// instance 在所属 entity 数组中的位置，与全局的 [`InstanceId`] 不同
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceSlot(pub usize);

/// entity 绘制时需要的网格信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshBinding {
    pub vertex_count: u32,
}

/// GPU 侧 instance buffer 的写入端
///
/// 真实实现把命令录制到 transfer command buffer 中，测试中直接写入内存
pub trait InstanceUploadSink {
    /// 保证 entity 的 instance buffer 至少能容纳 `capacity` 个 instance
    ///
    /// # return
    /// * true - buffer 被重新分配，旧内容与旧的 binding 都已失效
    fn ensure_instance_capacity(&mut self, entity: EntityId, capacity: usize) -> anyhow::Result<bool>;

    /// 写入从 `first_slot` 开始的连续 instance，`instances` 不超过 [`MAX_INSTANCES_PER_UPDATE`]
    fn update_instances(&mut self, entity: EntityId, first_slot: usize, instances: &[Instance]);

    /// 更新 indirect draw 参数
    fn update_draw_count(&mut self, entity: EntityId, vertex_count: u32, instance_count: u32);
}

/// 一次 dirty 同步录制了哪些内容
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub update_commands: usize,
    pub updated_instances: usize,
    pub reallocated_buffers: usize,
}

impl SyncReport {
    #[inline]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub struct EntityDefinition {
    mesh: MeshBinding,
    instances: GrowableArray<Instance>,
    /// 长度始终等于 instances 的容量
    dirty: Vec<bool>,
    /// 最后一次写入 indirect 参数的 instance 数量
    synced_instance_count: Option<u32>,
    /// 是否已经被计入命令列表
    drawable: bool,
}

impl EntityDefinition {
    fn new(mesh: MeshBinding, initial_capacity: usize, growth: usize) -> Self {
        let instances = GrowableArray::new(initial_capacity, growth);
        Self {
            mesh,
            dirty: vec![false; instances.capacity()],
            instances,
            synced_instance_count: None,
            drawable: false,
        }
    }

    #[inline]
    pub fn mesh(&self) -> MeshBinding {
        self.mesh
    }

    #[inline]
    pub fn instances(&self) -> &[Instance] {
        self.instances.as_slice()
    }

    #[inline]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    pub fn instance_capacity(&self) -> usize {
        self.instances.capacity()
    }

    #[inline]
    pub fn dirty_flags(&self) -> &[bool] {
        &self.dirty
    }

    #[inline]
    pub fn has_dirty(&self) -> bool {
        self.dirty.iter().any(|d| *d)
    }

    /// 当前命令列表中是否包含该 entity 的绘制
    #[inline]
    pub fn is_drawable(&self) -> bool {
        self.drawable
    }

    fn mark_dirty(&mut self, slot: usize) {
        self.dirty[slot] = true;
    }
}

/// 所有 entity definition 以及全局的 instance id 序列
pub struct EntityStore {
    definitions: GrowableArray<EntityDefinition>,
    id_sequence: InstanceIdSequence,
    instance_capacity: usize,
    instance_growth: usize,
    command_list_dirty: bool,
}

// new & init
impl EntityStore {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            definitions: GrowableArray::new(config.initial_entity_capacity, config.entity_growth),
            id_sequence: InstanceIdSequence::new(),
            instance_capacity: config.initial_instance_capacity,
            instance_growth: config.instance_growth,
            command_list_dirty: false,
        }
    }
}

// getters
impl EntityStore {
    #[inline]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    #[inline]
    pub fn definition(&self, id: EntityId) -> Option<&EntityDefinition> {
        self.definitions.get(id.0)
    }

    pub fn definitions(&self) -> impl Iterator<Item = (EntityId, &EntityDefinition)> {
        self.definitions.iter().enumerate().map(|(idx, def)| (EntityId(idx), def))
    }

    #[inline]
    pub fn command_list_dirty(&self) -> bool {
        self.command_list_dirty
    }

    /// 是否有 instance 等待上传
    pub fn has_pending_sync(&self) -> bool {
        self.definitions.iter().any(|def| def.has_dirty() || def.synced_instance_count != Some(def.instances.len() as u32))
    }

    /// 下一个 add_instance 将会分配的 id，序列耗尽时为 None
    #[inline]
    pub fn next_instance_id(&self) -> Option<InstanceId> {
        self.id_sequence.peek()
    }
}

// update
impl EntityStore {
    /// 新增一个 entity definition，初始没有任何 instance
    pub fn create_entity_definition(&mut self, mesh: MeshBinding) -> EntityId {
        let definition = EntityDefinition::new(mesh, self.instance_capacity, self.instance_growth);
        let (idx, growth) = self.definitions.push(definition);
        if let GrowthEvent::Grew { old_capacity, new_capacity } = growth {
            log::debug!("entity definitions grew {} -> {}", old_capacity, new_capacity);
        }

        self.command_list_dirty = true;
        EntityId(idx)
    }

    /// 追加 instance 并分配全局唯一的 id
    ///
    /// 不会触发命令列表重建，instance 数量的变化在同步时写入 indirect 参数。
    /// id 序列耗尽时返回错误，store 保持不变
    pub fn add_instance(&mut self, id: EntityId, mut instance: Instance) -> anyhow::Result<(InstanceSlot, InstanceId)> {
        let definition = self.definitions.get_mut(id.0).ok_or_else(|| anyhow::anyhow!("unknown entity {:?}", id))?;

        let instance_id = self.id_sequence.next().ok_or_else(|| anyhow::anyhow!("instance id sequence exhausted"))?;
        instance.instance_id = instance_id.0;

        let (slot, growth) = definition.instances.push(instance);
        if let GrowthEvent::Grew { old_capacity, new_capacity } = growth {
            log::debug!("instances of entity {} grew {} -> {}", id.0, old_capacity, new_capacity);
            definition.dirty.resize(new_capacity, false);
        }
        definition.mark_dirty(slot);

        Ok((InstanceSlot(slot), instance_id))
    }

    /// 修改已有 instance，修改后的 slot 会在下一次同步时上传
    pub fn instance_mut(&mut self, id: EntityId, slot: InstanceSlot) -> anyhow::Result<&mut Instance> {
        let definition = self.definitions.get_mut(id.0).ok_or_else(|| anyhow::anyhow!("unknown entity {:?}", id))?;
        anyhow::ensure!(slot.0 < definition.instances.len(), "slot {} out of range for entity {}", slot.0, id.0);

        definition.mark_dirty(slot.0);
        definition
            .instances
            .get_mut(slot.0)
            .ok_or_else(|| anyhow::anyhow!("slot {} out of range for entity {}", slot.0, id.0))
    }

    pub fn set_selected(&mut self, id: EntityId, slot: InstanceSlot, selected: bool) -> anyhow::Result<()> {
        self.instance_mut(id, slot)?.selected = selected as u32;
        Ok(())
    }

    #[inline]
    pub fn mark_command_list_dirty(&mut self) {
        self.command_list_dirty = true;
    }

    #[inline]
    pub fn clear_command_list_dirty(&mut self) {
        self.command_list_dirty = false;
    }

    /// 把所有脏 slot 录制到 `sink` 中，并在录制后清除脏标记
    ///
    /// 连续的脏 slot 合并为一条 update 命令，超过单条命令大小限制时再切分。
    /// buffer 重新分配后需要上传全部 instance，并且命令列表中的旧 binding 失效；
    /// entity 第一次拥有 instance 时同样需要重建命令列表。
    pub fn record_dirty_updates(&mut self, sink: &mut impl InstanceUploadSink) -> anyhow::Result<SyncReport> {
        let mut report = SyncReport::default();

        for (idx, definition) in self.definitions.iter_mut().enumerate() {
            let entity = EntityId(idx);
            let live = definition.instances.len();

            if sink.ensure_instance_capacity(entity, definition.instances.capacity())? {
                definition.dirty[..live].fill(true);
                definition.synced_instance_count = None;
                report.reallocated_buffers += 1;
                if definition.drawable {
                    self.command_list_dirty = true;
                }
            }

            for range in coalesce_dirty_ranges(&definition.dirty) {
                for chunk in range.split(MAX_INSTANCES_PER_UPDATE) {
                    sink.update_instances(entity, chunk.first, &definition.instances.as_slice()[chunk.slots()]);
                    report.update_commands += 1;
                    report.updated_instances += chunk.len();
                }
            }
            definition.dirty.fill(false);

            let instance_count = live as u32;
            if definition.synced_instance_count != Some(instance_count) {
                sink.update_draw_count(entity, definition.mesh.vertex_count, instance_count);
                definition.synced_instance_count = Some(instance_count);
            }

            if !definition.drawable && live > 0 {
                definition.drawable = true;
                self.command_list_dirty = true;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use glam::{Quat, Vec3};

    use super::*;

    /// 用内存模拟 GPU 上的 instance buffer 与 indirect 参数
    #[derive(Default)]
    pub(crate) struct MemorySink {
        pub buffers: HashMap<EntityId, Vec<Instance>>,
        pub draw_counts: HashMap<EntityId, (u32, u32)>,
        pub updates: Vec<(EntityId, usize, usize)>,
        pub allocations: usize,
    }

    impl InstanceUploadSink for MemorySink {
        fn ensure_instance_capacity(&mut self, entity: EntityId, capacity: usize) -> anyhow::Result<bool> {
            let current = self.buffers.get(&entity).map(|b| b.len()).unwrap_or(0);
            if current >= capacity {
                return Ok(false);
            }
            // 新分配的 buffer 内容未定义
            let garbage = Instance::identity().with_uniform_scale(-1.0);
            self.buffers.insert(entity, vec![garbage; capacity]);
            self.allocations += 1;
            Ok(true)
        }

        fn update_instances(&mut self, entity: EntityId, first_slot: usize, instances: &[Instance]) {
            assert!(instances.len() <= MAX_INSTANCES_PER_UPDATE);
            let buffer = self.buffers.get_mut(&entity).unwrap();
            buffer[first_slot..first_slot + instances.len()].copy_from_slice(instances);
            self.updates.push((entity, first_slot, instances.len()));
        }

        fn update_draw_count(&mut self, entity: EntityId, vertex_count: u32, instance_count: u32) {
            self.draw_counts.insert(entity, (vertex_count, instance_count));
        }
    }

    pub(crate) fn small_config() -> RendererConfig {
        RendererConfig {
            initial_entity_capacity: 2,
            entity_growth: 2,
            initial_instance_capacity: 4,
            instance_growth: 4,
            ..Default::default()
        }
    }

    fn instance_at(x: f32) -> Instance {
        Instance::new(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE)
    }

    fn device_bytes(sink: &MemorySink, entity: EntityId, len: usize) -> Vec<u8> {
        bytemuck::cast_slice(&sink.buffers[&entity][..len]).to_vec()
    }

    #[test]
    fn test_instance_ids_unique_and_monotonic_across_entities() {
        let mut store = EntityStore::new(&small_config());
        let a = store.create_entity_definition(MeshBinding { vertex_count: 3 });
        let b = store.create_entity_definition(MeshBinding { vertex_count: 6 });

        let mut ids = Vec::new();
        for i in 0..20 {
            let target = if i % 3 == 0 { b } else { a };
            let (_, id) = store.add_instance(target, instance_at(i as f32)).unwrap();
            ids.push(id.0);
        }
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(store.next_instance_id(), Some(InstanceId(ids[19] + 1)));

        // id 写入了 instance 本身
        let def = store.definition(b).unwrap();
        assert_eq!(def.instances()[0].id(), InstanceId(ids[0]));
    }

    #[test]
    fn test_add_instance_returns_slot_within_entity() {
        let mut store = EntityStore::new(&small_config());
        let a = store.create_entity_definition(MeshBinding { vertex_count: 3 });
        let b = store.create_entity_definition(MeshBinding { vertex_count: 3 });

        let (slot_a0, _) = store.add_instance(a, instance_at(0.0)).unwrap();
        let (slot_b0, _) = store.add_instance(b, instance_at(1.0)).unwrap();
        let (slot_a1, id_a1) = store.add_instance(a, instance_at(2.0)).unwrap();

        assert_eq!(slot_a0, InstanceSlot(0));
        assert_eq!(slot_b0, InstanceSlot(0));
        assert_eq!(slot_a1, InstanceSlot(1));
        assert_eq!(id_a1, InstanceId(2));
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let mut store = EntityStore::new(&small_config());
        assert!(store.add_instance(EntityId(3), Instance::identity()).is_err());
        assert!(store.instance_mut(EntityId(0), InstanceSlot(0)).is_err());
    }

    #[test]
    fn test_create_k_definitions() {
        let mut store = EntityStore::new(&small_config());
        let ids: Vec<_> = (0..5).map(|i| store.create_entity_definition(MeshBinding { vertex_count: i })).collect();

        assert_eq!(ids, (0..5).map(EntityId).collect::<Vec<_>>());
        for (id, def) in store.definitions() {
            assert_eq!(def.instance_count(), 0);
            assert!(!def.has_dirty());
            assert_eq!(def.dirty_flags().len(), def.instance_capacity());
            assert_eq!(def.mesh().vertex_count, id.0 as u32);
        }
    }

    #[test]
    fn test_growth_keeps_prefix() {
        let mut store = EntityStore::new(&small_config());
        let e = store.create_entity_definition(MeshBinding { vertex_count: 3 });
        let capacity = store.definition(e).unwrap().instance_capacity();

        for i in 0..capacity {
            store.add_instance(e, instance_at(i as f32)).unwrap();
        }
        let before = store.definition(e).unwrap().instances().to_vec();

        store.add_instance(e, instance_at(100.0)).unwrap();
        let def = store.definition(e).unwrap();
        assert_eq!(def.instance_capacity(), capacity + 4);
        assert_eq!(def.dirty_flags().len(), def.instance_capacity());
        assert_eq!(&def.instances()[..capacity], before.as_slice());
    }

    #[test]
    fn test_sync_reproduces_instances_byte_identical() {
        let mut store = EntityStore::new(&small_config());
        let e = store.create_entity_definition(MeshBinding { vertex_count: 36 });
        for i in 0..10 {
            store.add_instance(e, instance_at(i as f32 * 1.5)).unwrap();
        }

        let mut sink = MemorySink::default();
        let report = store.record_dirty_updates(&mut sink).unwrap();

        let def = store.definition(e).unwrap();
        assert!(!def.has_dirty());
        assert_eq!(report.updated_instances, 10);
        assert_eq!(device_bytes(&sink, e, 10), bytemuck::cast_slice::<_, u8>(def.instances()).to_vec());
        assert_eq!(sink.draw_counts[&e], (36, 10));
    }

    #[test]
    fn test_sync_coalesces_dirty_ranges() {
        let mut store = EntityStore::new(&small_config());
        let e = store.create_entity_definition(MeshBinding { vertex_count: 3 });
        for i in 0..10 {
            store.add_instance(e, instance_at(i as f32)).unwrap();
        }
        let mut sink = MemorySink::default();
        store.record_dirty_updates(&mut sink).unwrap();
        sink.updates.clear();

        for slot in [2, 3, 4, 7] {
            store.instance_mut(e, InstanceSlot(slot)).unwrap().position.y = 5.0;
        }
        let report = store.record_dirty_updates(&mut sink).unwrap();

        assert_eq!(sink.updates, vec![(e, 2, 3), (e, 7, 1)]);
        assert_eq!(report.update_commands, 2);
        assert_eq!(
            device_bytes(&sink, e, 10),
            bytemuck::cast_slice::<_, u8>(store.definition(e).unwrap().instances()).to_vec()
        );
    }

    #[test]
    fn test_sync_after_reallocation_uploads_everything() {
        let mut store = EntityStore::new(&small_config());
        let e = store.create_entity_definition(MeshBinding { vertex_count: 3 });
        for i in 0..4 {
            store.add_instance(e, instance_at(i as f32)).unwrap();
        }
        let mut sink = MemorySink::default();
        store.record_dirty_updates(&mut sink).unwrap();
        store.clear_command_list_dirty();

        // 超出容量，GPU buffer 需要重新分配
        store.add_instance(e, instance_at(4.0)).unwrap();
        let report = store.record_dirty_updates(&mut sink).unwrap();

        assert_eq!(report.reallocated_buffers, 1);
        assert_eq!(report.updated_instances, 5);
        assert!(store.command_list_dirty());
        assert_eq!(
            device_bytes(&sink, e, 5),
            bytemuck::cast_slice::<_, u8>(store.definition(e).unwrap().instances()).to_vec()
        );
    }

    #[test]
    fn test_large_range_split_into_update_limit() {
        let config = RendererConfig {
            initial_instance_capacity: 1024,
            ..small_config()
        };
        let mut store = EntityStore::new(&config);
        let e = store.create_entity_definition(MeshBinding { vertex_count: 3 });
        for i in 0..1000 {
            store.add_instance(e, instance_at(i as f32)).unwrap();
        }

        let mut sink = MemorySink::default();
        let report = store.record_dirty_updates(&mut sink).unwrap();

        assert_eq!(report.update_commands, 2);
        assert_eq!(sink.updates, vec![(e, 0, MAX_INSTANCES_PER_UPDATE), (e, MAX_INSTANCES_PER_UPDATE, 1000 - MAX_INSTANCES_PER_UPDATE)]);
    }

    #[test]
    fn test_rebuild_once_after_create_not_after_add_instance() {
        let mut store = EntityStore::new(&small_config());
        let mut sink = MemorySink::default();
        assert!(!store.command_list_dirty());

        let e = store.create_entity_definition(MeshBinding { vertex_count: 3 });
        store.add_instance(e, instance_at(0.0)).unwrap();
        store.record_dirty_updates(&mut sink).unwrap();
        assert!(store.command_list_dirty());
        store.clear_command_list_dirty();

        // 已经在绘制的 entity 新增 instance，只更新 indirect 参数
        store.add_instance(e, instance_at(1.0)).unwrap();
        assert!(!store.command_list_dirty());
        store.record_dirty_updates(&mut sink).unwrap();
        assert!(!store.command_list_dirty());
        assert_eq!(sink.draw_counts[&e], (3, 2));
    }

    #[test]
    fn test_selection_marks_dirty() {
        let mut store = EntityStore::new(&small_config());
        let e = store.create_entity_definition(MeshBinding { vertex_count: 3 });
        let (slot, _) = store.add_instance(e, instance_at(0.0)).unwrap();
        let mut sink = MemorySink::default();
        store.record_dirty_updates(&mut sink).unwrap();
        assert!(!store.has_pending_sync());

        store.set_selected(e, slot, true).unwrap();
        assert!(store.has_pending_sync());
        store.record_dirty_updates(&mut sink).unwrap();
        assert!(sink.buffers[&e][0].is_selected());
    }

    #[test]
    fn test_empty_entity_records_zero_draw_count() {
        let mut store = EntityStore::new(&small_config());
        let e = store.create_entity_definition(MeshBinding { vertex_count: 3 });
        let mut sink = MemorySink::default();
        let report = store.record_dirty_updates(&mut sink).unwrap();

        assert_eq!(report.update_commands, 0);
        assert_eq!(sink.draw_counts[&e], (3, 0));
        assert!(!store.definition(e).unwrap().is_drawable());
    }

    #[test]
    fn test_add_instance_fails_when_ids_exhausted() {
        let mut store = EntityStore::new(&small_config());
        let e = store.create_entity_definition(MeshBinding { vertex_count: 3 });
        store.id_sequence = InstanceIdSequence::starting_at(u32::MAX);

        let (_, last) = store.add_instance(e, instance_at(0.0)).unwrap();
        assert_eq!(last, InstanceId(u32::MAX));
        assert_eq!(store.next_instance_id(), None);

        let err = store.add_instance(e, instance_at(1.0)).unwrap_err();
        assert!(err.to_string().contains("exhausted"));
        // 失败的调用不能留下半个 instance
        assert_eq!(store.definition(e).unwrap().instances().len(), 1);
    }
}
