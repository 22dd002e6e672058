//! 单调合并：已知值只会被另一个已知值替换，永远不会退回未知。

use super::field::{Field, Flag};
use super::schema::*;

pub trait Merge {
    /// 用较新的结果补充自身
    fn merge_from(&mut self, newer: Self);
}

impl Merge for Field {
    fn merge_from(&mut self, newer: Self) {
        if newer.is_known() {
            *self = newer;
        }
    }
}

impl Merge for Flag {
    fn merge_from(&mut self, newer: Self) {
        if newer.is_known() {
            *self = newer;
        }
    }
}

impl<T: Merge> Merge for Option<T> {
    fn merge_from(&mut self, newer: Self) {
        match (self.as_mut(), newer) {
            (Some(current), Some(newer)) => current.merge_from(newer),
            (None, Some(newer)) => *self = Some(newer),
            (_, None) => {}
        }
    }
}

/// 并集，忽略大小写去重，保留原有顺序
impl Merge for Vec<String> {
    fn merge_from(&mut self, newer: Self) {
        for item in newer {
            if !self.iter().any(|existing| existing.eq_ignore_ascii_case(&item)) {
                self.push(item);
            }
        }
    }
}

/// 按名称对齐前驱体，保留已有名称的写法，新名称追加在末尾
impl Merge for Vec<Precursor> {
    fn merge_from(&mut self, newer: Self) {
        for mut precursor in newer {
            let was_empty = self.is_empty();
            let existing = precursor.name.as_deref().and_then(|name| {
                self.iter()
                    .position(|p| p.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            });
            match existing {
                Some(idx) => {
                    precursor.name = Field::unknown();
                    self[idx].merge_from(precursor);
                }
                None if precursor.name.is_known() || was_empty => self.push(precursor),
                None => {}
            }
        }
    }
}

/// 逐字段合并；解构保证结构体新增字段时这里必须同步
macro_rules! merge_fields {
    ($($ty:ident { $($field:ident),* $(,)? })*) => {
        $(
            impl Merge for $ty {
                fn merge_from(&mut self, newer: Self) {
                    let $ty { $($field),* } = newer;
                    $(self.$field.merge_from($field);)*
                }
            }
        )*
    };
}

merge_fields! {
    Quantity { value, unit }
    Measurement { value, unit, measurement_method, temperature }
    Conductivity { value, unit, temperature, measurement_conditions }
    Concentration { mol_per_l, mol_per_kg }
    Meta {
        name, chemical_formula, molecular_weight, structure_type,
        polymer_backbone, ionic_liquid_component, molar_ratio, concentration,
    }
    StructureSlot { name, smiles, description, molecular_weight, charge }
    MolecularStructures {
        polymer_backbone, ionic_liquid_cation, anion,
        monomer_unit, repeating_unit, crosslinker,
    }
    StructuralFeatures {
        alkyl_chain_length, functional_groups, degree_of_polymerization,
        crosslinking_density, molecular_architecture,
    }
    Precursor { name, amount, unit }
    PolymerizationConditions { temperature, time, atmosphere, catalyst }
    Synthesis {
        synthesis_method, precursors, polymerization_conditions,
        purification_method, synthesis_yield,
    }
    IonAssociation { free_ion_ratio, contact_ion_pair_ratio, measurement_method, temperature }
    StructureCharacterization {
        molecular_structure, degree_of_polymerization, glass_transition_temperature,
        thermal_stability, morphology, ion_association,
    }
    ElectrochemicalProperties {
        ionic_conductivity, lithium_transference_number,
        electrochemical_stability_window, interfacial_resistance,
    }
    MechanicalProperties { bulk_modulus, tensile_strength, elongation_at_break, storage_modulus }
    BatteryPerformance { capacity, cycling_stability, rate_capability, coulombic_efficiency }
    CrystalStructure { crystal_system, space_group, lattice_parameters, cif_available, notes }
    Others {
        applications, advantages, limitations,
        dataset_source, additional_information, reference_info,
    }
}

/// 处理记录和完整度在定稿时重新生成，这里不参与合并
impl Merge for MaterialRecord {
    fn merge_from(&mut self, newer: Self) {
        self.meta.merge_from(newer.meta);
        self.molecular_structures.merge_from(newer.molecular_structures);
        self.structural_features.merge_from(newer.structural_features);
        self.synthesis.merge_from(newer.synthesis);
        self.structure_characterization
            .merge_from(newer.structure_characterization);
        self.electrochemical_properties
            .merge_from(newer.electrochemical_properties);
        self.mechanical_properties.merge_from(newer.mechanical_properties);
        self.battery_performance.merge_from(newer.battery_performance);
        self.crystal_structure.merge_from(newer.crystal_structure);
        self.others.merge_from(newer.others);
    }
}

/// 合并材料列表：先按名称对齐，其次按位置对齐，无法对齐的新材料追加在末尾。
/// 已有材料不会被删除。返回新增的材料数。
pub fn merge_material_lists(existing: &mut Vec<MaterialRecord>, newer: Vec<MaterialRecord>) -> usize {
    let original_len = existing.len();
    let mut claimed = vec![false; original_len];
    let mut appended = Vec::new();

    for (position, record) in newer.into_iter().enumerate() {
        match find_counterpart(existing, &claimed, &record, position) {
            Some(idx) => {
                claimed[idx] = true;
                existing[idx].merge_from(record);
            }
            None => appended.push(record),
        }
    }

    let added = appended.len();
    existing.extend(appended);
    debug_assert!(existing.len() >= original_len);
    added
}

fn find_counterpart(
    existing: &[MaterialRecord],
    claimed: &[bool],
    record: &MaterialRecord,
    position: usize,
) -> Option<usize> {
    if let Some(name) = record.name() {
        let by_name = existing.iter().enumerate().position(|(idx, candidate)| {
            !claimed[idx]
                && candidate
                    .name()
                    .is_some_and(|existing_name| same_name(existing_name, name))
        });
        if by_name.is_some() {
            return by_name;
        }
    }

    // 名称都已知但不同，说明是新材料
    let candidate = existing.get(position)?;
    let names_conflict = matches!((candidate.name(), record.name()), (Some(_), Some(_)));
    (!claimed[position] && !names_conflict).then_some(position)
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
