//! Descriptor of the popler metadata catalog.
//!
//! Each catalog column is tagged with a [`Category`]; the browse layer consults
//! these tags instead of matching names ad hoc. The [`fields`] constants name
//! the columns the crate itself relies on.

use crate::error::{Error, Result};

/// Column names used throughout the crate.
pub mod fields {
    pub const PROJECT_KEY: &str = "proj_metadata_key";
    pub const TITLE: &str = "title";
    pub const LTERID: &str = "lterid";
    pub const AUTHORS: &str = "authors";
    pub const DOI: &str = "doi";
    pub const DOI_CITATION: &str = "doi_citation";
    pub const METALINK: &str = "metalink";
    pub const STUDYSTARTYR: &str = "studystartyr";
    pub const STUDYENDYR: &str = "studyendyr";
    pub const KINGDOM: &str = "kingdom";
    pub const PHYLUM: &str = "phylum";
    pub const CLSS: &str = "clss";
    pub const ORDR: &str = "ordr";
    pub const FAMILY: &str = "family";
    pub const GENUS: &str = "genus";
    pub const SPECIES: &str = "species";
    pub const COVARIATES: &str = "covariates";
}

/// What a catalog column describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Key,
    Study,
    Temporal,
    Spatial,
    Structure,
    Treatment,
    Location,
    Citation,
    Taxonomy,
}

/// Which taxonomy columns count as taxonomic when nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaxonomySet {
    /// Only the taxonomy columns of the default column selection.
    #[default]
    Default,
    /// Every taxonomy column of the catalog.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub category: Category,
    /// Part of the default column selection.
    pub default: bool,
}

const fn f(name: &'static str, category: Category, default: bool) -> Field {
    Field {
        name,
        category,
        default,
    }
}

use Category::{Citation, Key, Location, Spatial, Structure, Study, Taxonomy, Temporal, Treatment};

const POPLER_FIELDS: &[Field] = &[
    f("title", Study, true),
    f("proj_metadata_key", Key, true),
    f("lterid", Study, true),
    f("lter_name", Study, false),
    f("datatype", Study, true),
    f("structured_data", Study, true),
    f("studytype", Study, true),
    f("community", Study, true),
    f("derived", Study, false),
    f("control_group", Study, false),
    f("currently_funded", Study, false),
    f("homepage", Study, false),
    f("current_principle_investigator", Study, false),
    f("duration_years", Temporal, true),
    f("studystartyr", Temporal, true),
    f("studyendyr", Temporal, true),
    f("samplefreq", Temporal, false),
    f("sitestartyr", Temporal, false),
    f("siteendyr", Temporal, false),
    f("spatial_replication_level_1_label", Spatial, false),
    f("spatial_replication_level_1_number_of_unique_reps", Spatial, false),
    f("spatial_replication_level_2_label", Spatial, false),
    f("spatial_replication_level_2_number_of_unique_reps", Spatial, false),
    f("spatial_replication_level_3_label", Spatial, false),
    f("spatial_replication_level_3_number_of_unique_reps", Spatial, false),
    f("spatial_replication_level_4_label", Spatial, false),
    f("spatial_replication_level_4_number_of_unique_reps", Spatial, false),
    f("spatial_replication_level_5_label", Spatial, false),
    f("spatial_replication_level_5_number_of_unique_reps", Spatial, false),
    f("tot_spat_rep", Spatial, false),
    f("n_spat_levs", Spatial, false),
    f("structured_type_1", Structure, false),
    f("structured_type_1_units", Structure, false),
    f("structured_type_2", Structure, false),
    f("structured_type_2_units", Structure, false),
    f("structured_type_3", Structure, false),
    f("structured_type_3_units", Structure, false),
    f("structured_type_4", Structure, false),
    f("structured_type_4_units", Structure, false),
    f("treatment_type_1", Treatment, true),
    f("treatment_type_2", Treatment, false),
    f("treatment_type_3", Treatment, false),
    f("lat_lter", Location, true),
    f("lng_lter", Location, true),
    f("authors", Citation, false),
    f("authors_contact", Citation, false),
    f("metalink", Citation, false),
    f("knbid", Citation, false),
    f("doi", Citation, false),
    f("doi_citation", Citation, false),
    f("sppcode", Taxonomy, false),
    f("kingdom", Taxonomy, true),
    f("subkingdom", Taxonomy, false),
    f("infrakingdom", Taxonomy, false),
    f("superdivision", Taxonomy, false),
    f("division", Taxonomy, false),
    f("subdivision", Taxonomy, false),
    f("superphylum", Taxonomy, false),
    f("phylum", Taxonomy, true),
    f("subphylum", Taxonomy, false),
    f("clss", Taxonomy, true),
    f("subclass", Taxonomy, false),
    f("ordr", Taxonomy, true),
    f("family", Taxonomy, true),
    f("genus", Taxonomy, true),
    f("species", Taxonomy, true),
    f("common_name", Taxonomy, false),
    f("authority", Taxonomy, false),
];

static POPLER: Schema = Schema::new(POPLER_FIELDS);

/// An ordered set of known columns with their category tags.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    fields: &'static [Field],
}

impl Schema {
    /// The first [`Category::Key`] field is the primary key.
    pub const fn new(fields: &'static [Field]) -> Self {
        Self { fields }
    }

    /// The popler project-metadata catalog.
    pub fn popler() -> &'static Schema {
        &POPLER
    }

    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }

    pub fn get(&self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn category(&self, name: &str) -> Option<Category> {
        self.get(name).map(|f| f.category)
    }

    pub fn primary_key(&self) -> &'static str {
        self.fields
            .iter()
            .find(|f| f.category == Category::Key)
            .map(|f| f.name)
            .unwrap_or(fields::PROJECT_KEY)
    }

    pub fn default_columns(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.default)
            .map(|f| f.name)
            .collect()
    }

    pub fn all_columns(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    pub fn taxonomy(&self, set: TaxonomySet) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.category == Category::Taxonomy)
            .filter(|f| set == TaxonomySet::Full || f.default)
            .map(|f| f.name)
            .collect()
    }

    pub fn is_taxonomic(&self, name: &str, set: TaxonomySet) -> bool {
        self.get(name).is_some_and(|f| {
            f.category == Category::Taxonomy && (set == TaxonomySet::Full || f.default)
        })
    }

    /// Fails with [`Error::MisspelledColumn`] naming every unknown column.
    pub fn validate<S: AsRef<str>>(&self, columns: &[S]) -> Result<()> {
        let unknown: Vec<String> = columns
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| !self.contains(c))
            .map(str::to_string)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::MisspelledColumn { columns: unknown })
        }
    }
}
