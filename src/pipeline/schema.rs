//! 材料记录的数据结构。
//!
//! 顶层十个分区在任何记录中都存在；叶子值未知时写出为 `"N/A"`。
//! 键名沿用历史数据文件中的写法，同时接受下划线形式的别名。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field::{lenient, lenient_list, Field, Flag, Lenient, ListItem, PLACEHOLDER};

/// 至少有这么多个结构槽位给出 SMILES 才视为可用于机器学习
pub const ML_READY_MIN_SMILES: usize = 2;

/// 记录的十个顶层分区
pub const SECTION_KEYS: [&str; 10] = [
    "meta",
    "molecular_structures",
    "structural_features",
    "synthesis",
    "structure_characterization",
    "electrochemical_properties",
    "mechanical_properties",
    "battery_performance",
    "crystal_structure",
    "others",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quantity {
    pub value: Field,
    pub unit: Field,
}

impl Quantity {
    fn with_unit(unit: &str) -> Self {
        Self {
            value: Field::unknown(),
            unit: Field::known(unit),
        }
    }
}

impl Lenient for Quantity {
    fn from_scalar(value: Field) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }
}

/// 带测试条件的数值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Measurement {
    pub value: Field,
    pub unit: Field,
    pub measurement_method: Field,
    pub temperature: Field,
}

impl Lenient for Measurement {
    fn from_scalar(value: Field) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conductivity {
    pub value: Field,
    pub unit: Field,
    pub temperature: Field,
    pub measurement_conditions: Field,
}

impl Lenient for Conductivity {
    fn from_scalar(value: Field) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Concentration {
    #[serde(rename = "mol_per_L", alias = "mol_per_l", deserialize_with = "lenient")]
    pub mol_per_l: Quantity,
    #[serde(deserialize_with = "lenient")]
    pub mol_per_kg: Quantity,
}

impl Lenient for Concentration {
    fn from_scalar(value: Field) -> Self {
        Self {
            mol_per_l: Quantity::from_scalar(value),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Meta {
    pub name: Field,
    #[serde(rename = "chemical formula", alias = "chemical_formula")]
    pub chemical_formula: Field,
    #[serde(
        rename = "molecular weight",
        alias = "molecular_weight",
        deserialize_with = "lenient"
    )]
    pub molecular_weight: Quantity,
    #[serde(rename = "structure type", alias = "structure_type")]
    pub structure_type: Field,
    #[serde(rename = "polymer backbone", alias = "polymer_backbone")]
    pub polymer_backbone: Field,
    #[serde(rename = "ionic liquid component", alias = "ionic_liquid_component")]
    pub ionic_liquid_component: Field,
    pub molar_ratio: Field,
    #[serde(deserialize_with = "lenient")]
    pub concentration: Concentration,
}

impl Lenient for Meta {
    fn from_scalar(name: Field) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }
}

/// 一个分子结构槽位；分子量只在主链上出现，电荷只在阳离子和阴离子上出现
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureSlot {
    pub name: Field,
    pub smiles: Field,
    pub description: Field,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub molecular_weight: Option<Field>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge: Option<Field>,
}

impl StructureSlot {
    pub fn has_smiles(&self) -> bool {
        self.smiles.is_known()
    }
}

impl Lenient for StructureSlot {
    fn from_scalar(name: Field) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MolecularStructures {
    #[serde(deserialize_with = "lenient")]
    pub polymer_backbone: StructureSlot,
    #[serde(deserialize_with = "lenient")]
    pub ionic_liquid_cation: StructureSlot,
    #[serde(deserialize_with = "lenient")]
    pub anion: StructureSlot,
    #[serde(deserialize_with = "lenient")]
    pub monomer_unit: StructureSlot,
    #[serde(deserialize_with = "lenient")]
    pub repeating_unit: StructureSlot,
    #[serde(deserialize_with = "lenient")]
    pub crosslinker: StructureSlot,
}

impl MolecularStructures {
    pub fn slots(&self) -> [&StructureSlot; 6] {
        [
            &self.polymer_backbone,
            &self.ionic_liquid_cation,
            &self.anion,
            &self.monomer_unit,
            &self.repeating_unit,
            &self.crosslinker,
        ]
    }

    pub fn smiles_count(&self) -> usize {
        self.slots().iter().filter(|slot| slot.has_smiles()).count()
    }
}

impl Lenient for MolecularStructures {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralFeatures {
    pub alkyl_chain_length: Field,
    #[serde(deserialize_with = "lenient_list")]
    pub functional_groups: Vec<String>,
    pub degree_of_polymerization: Field,
    pub crosslinking_density: Field,
    pub molecular_architecture: Field,
}

impl Lenient for StructuralFeatures {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Precursor {
    pub name: Field,
    pub amount: Field,
    pub unit: Field,
}

impl Precursor {
    fn is_blank(&self) -> bool {
        !(self.name.is_known() || self.amount.is_known() || self.unit.is_known())
    }
}

impl ListItem for Precursor {
    fn from_json(value: Value) -> Option<Self> {
        let precursor = match value {
            Value::Object(_) => serde_json::from_value(value).ok()?,
            scalar => Precursor {
                name: Field::from_json(scalar),
                ..Self::default()
            },
        };
        (!precursor.is_blank()).then_some(precursor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolymerizationConditions {
    pub temperature: Field,
    pub time: Field,
    pub atmosphere: Field,
    pub catalyst: Field,
}

impl Lenient for PolymerizationConditions {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Synthesis {
    #[serde(rename = "synthesis method", alias = "synthesis_method")]
    pub synthesis_method: Field,
    #[serde(deserialize_with = "lenient_list")]
    pub precursors: Vec<Precursor>,
    #[serde(
        rename = "polymerization conditions",
        alias = "polymerization_conditions",
        deserialize_with = "lenient"
    )]
    pub polymerization_conditions: PolymerizationConditions,
    #[serde(rename = "purification method", alias = "purification_method")]
    pub purification_method: Field,
    #[serde(rename = "yield")]
    pub synthesis_yield: Field,
}

impl Lenient for Synthesis {
    fn from_scalar(synthesis_method: Field) -> Self {
        Self {
            synthesis_method,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IonAssociation {
    #[serde(deserialize_with = "lenient")]
    pub free_ion_ratio: Quantity,
    #[serde(deserialize_with = "lenient")]
    pub contact_ion_pair_ratio: Quantity,
    pub measurement_method: Field,
    pub temperature: Field,
}

impl Lenient for IonAssociation {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureCharacterization {
    #[serde(rename = "molecular structure", alias = "molecular_structure")]
    pub molecular_structure: Field,
    pub degree_of_polymerization: Field,
    #[serde(deserialize_with = "lenient")]
    pub glass_transition_temperature: Quantity,
    #[serde(deserialize_with = "lenient")]
    pub thermal_stability: Quantity,
    pub morphology: Field,
    #[serde(deserialize_with = "lenient")]
    pub ion_association: IonAssociation,
}

impl Lenient for StructureCharacterization {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectrochemicalProperties {
    #[serde(deserialize_with = "lenient")]
    pub ionic_conductivity: Conductivity,
    #[serde(deserialize_with = "lenient")]
    pub lithium_transference_number: Measurement,
    #[serde(deserialize_with = "lenient")]
    pub electrochemical_stability_window: Quantity,
    #[serde(deserialize_with = "lenient")]
    pub interfacial_resistance: Quantity,
}

impl Lenient for ElectrochemicalProperties {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MechanicalProperties {
    #[serde(deserialize_with = "lenient")]
    pub bulk_modulus: Measurement,
    #[serde(deserialize_with = "lenient")]
    pub tensile_strength: Quantity,
    #[serde(deserialize_with = "lenient")]
    pub elongation_at_break: Quantity,
    #[serde(deserialize_with = "lenient")]
    pub storage_modulus: Quantity,
}

impl Lenient for MechanicalProperties {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryPerformance {
    #[serde(deserialize_with = "lenient")]
    pub capacity: Quantity,
    pub cycling_stability: Field,
    pub rate_capability: Field,
    #[serde(deserialize_with = "lenient")]
    pub coulombic_efficiency: Quantity,
}

impl Lenient for BatteryPerformance {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrystalStructure {
    pub crystal_system: Field,
    pub space_group: Field,
    pub lattice_parameters: Field,
    pub cif_available: Flag,
    pub notes: Field,
}

impl Lenient for CrystalStructure {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Others {
    #[serde(deserialize_with = "lenient_list")]
    pub applications: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub advantages: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub limitations: Vec<String>,
    pub dataset_source: Field,
    pub additional_information: Field,
    pub reference_info: Field,
}

impl Lenient for Others {
    fn from_scalar(additional_information: Field) -> Self {
        Self {
            additional_information,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleType {
    Review,
    Research,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ArticleType {
    pub fn from_review_flag(is_review: bool) -> Self {
        if is_review {
            Self::Review
        } else {
            Self::Research
        }
    }

    pub fn is_review(self) -> bool {
        self == Self::Review
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Research => "research",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ArticleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 处理记录，每次成功处理文档时生成一次
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingMetadata {
    pub processing_date: String,
    pub num_images_analyzed: usize,
    pub total_images: usize,
    pub includes_structure_analysis: bool,
    pub original_folder_name: String,
    pub article_type: ArticleType,
    pub is_review: bool,
    pub abstract_length: usize,
    pub pils_relevant: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material_index: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureCompleteness {
    pub total_structure_fields: usize,
    pub filled_smiles_count: usize,
    pub has_polymer_backbone: bool,
    pub has_cation: bool,
    pub has_anion: bool,
    pub ready_for_ml: bool,
}

impl StructureCompleteness {
    pub fn assess(structures: &MolecularStructures) -> Self {
        let filled = structures.smiles_count();
        Self {
            total_structure_fields: structures.slots().len(),
            filled_smiles_count: filled,
            has_polymer_backbone: structures.polymer_backbone.has_smiles(),
            has_cation: structures.ionic_liquid_cation.has_smiles(),
            has_anion: structures.anion.has_smiles(),
            ready_for_ml: filled >= ML_READY_MIN_SMILES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialRecord {
    #[serde(deserialize_with = "lenient")]
    pub meta: Meta,
    #[serde(deserialize_with = "lenient")]
    pub molecular_structures: MolecularStructures,
    #[serde(deserialize_with = "lenient")]
    pub structural_features: StructuralFeatures,
    #[serde(deserialize_with = "lenient")]
    pub synthesis: Synthesis,
    #[serde(deserialize_with = "lenient")]
    pub structure_characterization: StructureCharacterization,
    #[serde(deserialize_with = "lenient")]
    pub electrochemical_properties: ElectrochemicalProperties,
    #[serde(deserialize_with = "lenient")]
    pub mechanical_properties: MechanicalProperties,
    #[serde(deserialize_with = "lenient")]
    pub battery_performance: BatteryPerformance,
    #[serde(deserialize_with = "lenient")]
    pub crystal_structure: CrystalStructure,
    #[serde(deserialize_with = "lenient")]
    pub others: Others,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_info: Option<ProcessingMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure_completeness: Option<StructureCompleteness>,
}

impl MaterialRecord {
    pub fn name(&self) -> Option<&str> {
        self.meta.name.as_deref()
    }

    pub fn article_type(&self) -> ArticleType {
        self.processing_info
            .as_ref()
            .map(|info| info.article_type)
            .unwrap_or_default()
    }

    /// 写入处理记录并重新计算结构完整度
    pub fn finalize(&mut self, metadata: ProcessingMetadata) {
        self.structure_completeness = Some(StructureCompleteness::assess(&self.molecular_structures));
        self.processing_info = Some(metadata);
    }

    /// 提示词中使用的空模板：保留单位、电荷等固定值，其余留空
    pub fn template() -> Self {
        let mut record = Self::default();
        record.meta.molecular_weight = Quantity::with_unit("g/mol");
        record.meta.concentration = Concentration {
            mol_per_l: Quantity::with_unit("mol/L"),
            mol_per_kg: Quantity::with_unit("mol/kg"),
        };

        let structures = &mut record.molecular_structures;
        structures.polymer_backbone.molecular_weight = Some(Field::unknown());
        structures.ionic_liquid_cation.charge = Some(Field::known("+1"));
        structures.anion.charge = Some(Field::known("-1"));

        record.synthesis.precursors = vec![Precursor::default()];
        record.crystal_structure.cif_available = Flag::known(false);
        record
    }

    /// 顶层至少含一个分区的对象才可能是一条记录，嵌套的片段不算
    pub fn is_record_like(value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|map| SECTION_KEYS.iter().any(|key| map.contains_key(*key)))
    }

    pub fn prompt_template() -> Value {
        let mut value = serde_json::to_value(Self::template()).unwrap_or(Value::Null);
        blank_placeholders(&mut value);
        value
    }
}

fn blank_placeholders(value: &mut Value) {
    match value {
        Value::String(s) if s == PLACEHOLDER => s.clear(),
        Value::Array(items) => items.iter_mut().for_each(blank_placeholders),
        Value::Object(map) => map.values_mut().for_each(blank_placeholders),
        _ => {}
    }
}
