//! Sites, site arrays, and site families.
//!
//! A [`Site`] is a vertex of a tight-binding graph, identified by its
//! [`SiteFamily`] and an integer-vector [`Tag`] that is unique within that
//! family. A [`SiteArray`] holds many tags of one family at once so that a
//! single vectorized term can describe a whole block of sites or hoppings.
//!
//! Every family carries exactly one tag normalization rule ([`TagRule`]):
//! either a per-tag rule or a bulk rule. The other form is derived, so bulk
//! construction of a [`SiteArray`] goes through one call whenever the family
//! has a genuine bulk rule.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, Range};
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use thiserror::Error;

/// Errors raised while normalizing tags or constructing site families.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("Tag {tag} is not allowed for site family {family}: {source}")]
    NotAllowed {
        tag: Tag,
        family: String,
        #[source]
        source: Box<TagError>,
    },

    #[error("Tags of shape ({rows}, {cols}) are not allowed for site family {family}: {source}")]
    NotAllowedBulk {
        rows: usize,
        cols: usize,
        family: String,
        #[source]
        source: Box<TagError>,
    },

    #[error("wrong tag length: expected {expected}, got {found}")]
    Length { expected: usize, found: usize },

    #[error("normalized tags have differing lengths")]
    Ragged,

    #[error("bulk tag rule returned {found} tags for {expected} inputs")]
    BulkCount { expected: usize, found: usize },

    #[error("{0}")]
    Malformed(String),

    #[error("The norbs parameter must be an integer > 0")]
    InvalidNorbs,
}

/// Normalized identifier of a site within its family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(Box<[i64]>);

impl Tag {
    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }
}

impl Deref for Tag {
    type Target = [i64];

    fn deref(&self) -> &[i64] {
        &self.0
    }
}

impl From<Vec<i64>> for Tag {
    fn from(v: Vec<i64>) -> Self {
        Tag(v.into_boxed_slice())
    }
}

impl From<&[i64]> for Tag {
    fn from(v: &[i64]) -> Self {
        Tag(v.into())
    }
}

impl<const N: usize> From<[i64; N]> for Tag {
    fn from(v: [i64; N]) -> Self {
        Tag(Box::new(v))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (n, x) in self.0.iter().enumerate() {
            if n > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", x)?;
        }
        write!(f, ")")
    }
}

/// A rule that brings a single tag to canonical form.
pub trait NormalizeTag: Send + Sync {
    fn normalize_tag(&self, tag: &[i64]) -> Result<Tag, TagError>;
}

/// A rule that brings a whole block of tags (one per row) to canonical form.
pub trait NormalizeTags: Send + Sync {
    fn normalize_tags(&self, tags: ArrayView2<'_, i64>) -> Result<Array2<i64>, TagError>;
}

/// Real-space geometry of a family. Optional; only used for positions.
pub trait SitePositions: Send + Sync {
    /// Position of the site with the given tag.
    fn pos(&self, tag: &[i64]) -> Array1<f64>;

    /// Positions of many sites, one row per tag.
    fn positions(&self, tags: ArrayView2<'_, i64>) -> Array2<f64> {
        let rows: Vec<Array1<f64>> = tags.outer_iter().map(|t| self.pos(&t.to_vec())).collect();
        let dim = rows.first().map_or(0, |r| r.len());
        let mut out = Array2::zeros((rows.len(), dim));
        for (mut dst, src) in out.outer_iter_mut().zip(rows) {
            dst.assign(&src);
        }
        out
    }
}

/// The normalization rule of a family. Exactly one form is supplied; the
/// other is derived from it.
#[derive(Clone)]
pub enum TagRule {
    PerTag(Arc<dyn NormalizeTag>),
    Bulk(Arc<dyn NormalizeTags>),
}

#[derive(Clone)]
struct FamilyData {
    canonical_repr: String,
    name: String,
    norbs: Option<usize>,
    rule: TagRule,
    geometry: Option<Arc<dyn SitePositions>>,
}

/// The "type" of a site.
///
/// Equality, hashing, and ordering are defined purely by the canonical
/// representation; the name only disambiguates for display.
#[derive(Clone)]
pub struct SiteFamily(Arc<FamilyData>);

impl SiteFamily {
    /// Create a family.
    ///
    /// # Arguments
    /// * `canonical_repr` - Uniquely identifies the family.
    /// * `name` - Disambiguating label, may be empty.
    /// * `norbs` - Orbitals per site. `None` is accepted but deprecated.
    /// * `rule` - Tag normalization rule.
    pub fn new(
        canonical_repr: impl Into<String>,
        name: impl Into<String>,
        norbs: Option<usize>,
        rule: TagRule,
    ) -> Result<Self, TagError> {
        let canonical_repr = canonical_repr.into();
        match norbs {
            Some(0) => return Err(TagError::InvalidNorbs),
            None => log::warn!(
                "Not specifying norbs is deprecated. Always specify norbs when creating site families ({}).",
                canonical_repr
            ),
            Some(_) => {}
        }
        Ok(Self(Arc::new(FamilyData {
            canonical_repr,
            name: name.into(),
            norbs,
            rule,
            geometry: None,
        })))
    }

    /// A family whose tags are integer vectors of fixed length `dim`.
    pub fn integer(name: &str, dim: usize, norbs: usize) -> Result<Self, TagError> {
        Self::new(
            format!("IntegerTags(dim={}, name={:?}, norbs={})", dim, name, norbs),
            name,
            Some(norbs),
            TagRule::PerTag(Arc::new(IntegerTags { dim })),
        )
    }

    /// A Bravais-lattice family with real-space positions
    /// `offset + tag · prim_vecs`.
    pub fn lattice(
        name: &str,
        prim_vecs: Array2<f64>,
        offset: Array1<f64>,
        norbs: usize,
    ) -> Result<Self, TagError> {
        if offset.len() != prim_vecs.ncols() {
            return Err(TagError::Length {
                expected: prim_vecs.ncols(),
                found: offset.len(),
            });
        }
        let repr = format!(
            "LatticeTags(prim_vecs={:?}, offset={:?}, name={:?}, norbs={})",
            prim_vecs.outer_iter().map(|r| r.to_vec()).collect::<Vec<_>>(),
            offset.to_vec(),
            name,
            norbs
        );
        let rule = Arc::new(LatticeTags { prim_vecs, offset });
        Ok(Self::new(repr, name, Some(norbs), TagRule::Bulk(rule.clone()))?.with_positions(rule))
    }

    /// Attach a real-space geometry.
    pub fn with_positions(mut self, geometry: Arc<dyn SitePositions>) -> Self {
        Arc::make_mut(&mut self.0).geometry = Some(geometry);
        self
    }

    pub fn canonical_repr(&self) -> &str {
        &self.0.canonical_repr
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn norbs(&self) -> Option<usize> {
        self.0.norbs
    }

    /// Bring one tag to canonical form.
    pub fn normalize_tag(&self, tag: &[i64]) -> Result<Tag, TagError> {
        match &self.0.rule {
            TagRule::PerTag(rule) => rule.normalize_tag(tag),
            TagRule::Bulk(rule) => {
                let tags = Array2::from_shape_vec((1, tag.len()), tag.to_vec())
                    .map_err(|e| TagError::Malformed(e.to_string()))?;
                let out = rule.normalize_tags(tags.view())?;
                match out.nrows() {
                    1 => Ok(Tag::from(out.row(0).to_vec())),
                    found => Err(TagError::BulkCount { expected: 1, found }),
                }
            }
        }
    }

    /// Bring a block of tags (one per row) to canonical form.
    pub fn normalize_tags(&self, tags: ArrayView2<'_, i64>) -> Result<Array2<i64>, TagError> {
        match &self.0.rule {
            TagRule::Bulk(rule) => {
                let out = rule.normalize_tags(tags)?;
                if out.nrows() != tags.nrows() {
                    return Err(TagError::BulkCount {
                        expected: tags.nrows(),
                        found: out.nrows(),
                    });
                }
                Ok(out)
            }
            TagRule::PerTag(rule) => {
                let mut width = None;
                let mut flat = Vec::with_capacity(tags.len());
                for row in tags.outer_iter() {
                    let tag = rule.normalize_tag(&row.to_vec())?;
                    if *width.get_or_insert(tag.len()) != tag.len() {
                        return Err(TagError::Ragged);
                    }
                    flat.extend_from_slice(&tag);
                }
                let width = width.unwrap_or(tags.ncols());
                Array2::from_shape_vec((tags.nrows(), width), flat)
                    .map_err(|e| TagError::Malformed(e.to_string()))
            }
        }
    }

    /// Convenience for `Site::new(family, tag)`.
    pub fn site(&self, tag: &[i64]) -> Result<Site, TagError> {
        Site::new(self.clone(), tag)
    }

    /// Real-space position of a tag, if the family has a geometry.
    pub fn pos(&self, tag: &[i64]) -> Option<Array1<f64>> {
        self.0.geometry.as_ref().map(|g| g.pos(tag))
    }

    pub fn positions(&self, tags: ArrayView2<'_, i64>) -> Option<Array2<f64>> {
        self.0.geometry.as_ref().map(|g| g.positions(tags))
    }

    fn label(&self) -> String {
        if self.0.name.is_empty() {
            self.0.canonical_repr.clone()
        } else {
            self.0.name.clone()
        }
    }
}

impl PartialEq for SiteFamily {
    fn eq(&self, other: &Self) -> bool {
        self.0.canonical_repr == other.0.canonical_repr
    }
}

impl Eq for SiteFamily {}

impl Hash for SiteFamily {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.canonical_repr.hash(state);
    }
}

impl PartialOrd for SiteFamily {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SiteFamily {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.canonical_repr.cmp(&other.0.canonical_repr)
    }
}

impl fmt::Debug for SiteFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.canonical_repr)
    }
}

impl fmt::Display for SiteFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let orbs = match self.0.norbs {
            Some(n) => format!(" with {} orbitals", n),
            None => String::new(),
        };
        if self.0.name.is_empty() {
            write!(f, "<unnamed site family{}>", orbs)
        } else {
            write!(f, "<site family {}{}>", self.0.name, orbs)
        }
    }
}

/// A vertex of the tight-binding graph: a family and a normalized tag.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Site {
    family: SiteFamily,
    tag: Tag,
}

impl Site {
    /// Create a site, normalizing `tag` with the family's rule.
    pub fn new(family: SiteFamily, tag: &[i64]) -> Result<Self, TagError> {
        let tag = family.normalize_tag(tag).map_err(|e| TagError::NotAllowed {
            tag: Tag::from(tag),
            family: family.canonical_repr().to_string(),
            source: Box::new(e),
        })?;
        Ok(Self { family, tag })
    }

    /// Create a site from a tag that is already in canonical form.
    pub fn from_normalized(family: SiteFamily, tag: Tag) -> Self {
        Self { family, tag }
    }

    pub fn family(&self) -> &SiteFamily {
        &self.family
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Real-space position, if the family supports it.
    pub fn pos(&self) -> Option<Array1<f64>> {
        self.family.pos(&self.tag)
    }
}

impl fmt::Debug for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Site({:?}, {})", self.family, self.tag)
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Site {} of {}>", self.tag, self.family.label())
    }
}

/// Many sites of one family, stored as one tag per row.
#[derive(Clone, Debug)]
pub struct SiteArray {
    family: SiteFamily,
    tags: Array2<i64>,
}

impl SiteArray {
    /// Create a site array, normalizing all tags in one call.
    pub fn new(family: SiteFamily, tags: Array2<i64>) -> Result<Self, TagError> {
        let (rows, cols) = tags.dim();
        let tags = family
            .normalize_tags(tags.view())
            .map_err(|e| TagError::NotAllowedBulk {
                rows,
                cols,
                family: family.canonical_repr().to_string(),
                source: Box::new(e),
            })?;
        Ok(Self { family, tags })
    }

    /// Create a site array from tags already in canonical form.
    pub fn from_normalized(family: SiteFamily, tags: Array2<i64>) -> Self {
        Self { family, tags }
    }

    pub fn family(&self) -> &SiteFamily {
        &self.family
    }

    pub fn tags(&self) -> ArrayView2<'_, i64> {
        self.tags.view()
    }

    pub fn len(&self) -> usize {
        self.tags.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.nrows() == 0
    }

    /// The site at `index`.
    pub fn get(&self, index: usize) -> Option<Site> {
        (index < self.len()).then(|| {
            Site::from_normalized(self.family.clone(), Tag::from(self.tags.row(index).to_vec()))
        })
    }

    /// The sites in `range`, or `None` if the range is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> Option<SiteArray> {
        if range.start > range.end || range.end > self.len() {
            return None;
        }
        let tags = self.tags.slice(ndarray::s![range, ..]).to_owned();
        Some(Self::from_normalized(self.family.clone(), tags))
    }

    /// The sites at the given offsets, in order.
    pub fn select(&self, offsets: &[usize]) -> Option<SiteArray> {
        if offsets.iter().any(|&o| o >= self.len()) {
            return None;
        }
        let tags = self.tags.select(Axis(0), offsets);
        Some(Self::from_normalized(self.family.clone(), tags))
    }

    pub fn iter(&self) -> impl Iterator<Item = Site> + '_ {
        self.tags
            .outer_iter()
            .map(move |t| Site::from_normalized(self.family.clone(), Tag::from(t.to_vec())))
    }

    /// Real-space positions, one row per site, if the family supports it.
    pub fn positions(&self) -> Option<Array2<f64>> {
        self.family.positions(self.tags.view())
    }
}

impl PartialEq for SiteArray {
    fn eq(&self, other: &Self) -> bool {
        self.family == other.family && self.tags == other.tags
    }
}

impl fmt::Display for SiteArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<SiteArray of {} sites of {}>", self.len(), self.family.label())
    }
}

/// Tags are integer vectors of a fixed length.
#[derive(Debug, Clone, Copy)]
pub struct IntegerTags {
    pub dim: usize,
}

impl NormalizeTag for IntegerTags {
    fn normalize_tag(&self, tag: &[i64]) -> Result<Tag, TagError> {
        if tag.len() != self.dim {
            return Err(TagError::Length {
                expected: self.dim,
                found: tag.len(),
            });
        }
        Ok(Tag::from(tag))
    }
}

/// Tags index a Bravais lattice with the given primitive vectors (rows).
#[derive(Debug, Clone)]
pub struct LatticeTags {
    prim_vecs: Array2<f64>,
    offset: Array1<f64>,
}

impl LatticeTags {
    pub fn new(prim_vecs: Array2<f64>, offset: Array1<f64>) -> Self {
        Self { prim_vecs, offset }
    }
}

impl NormalizeTags for LatticeTags {
    fn normalize_tags(&self, tags: ArrayView2<'_, i64>) -> Result<Array2<i64>, TagError> {
        let dim = self.prim_vecs.nrows();
        if tags.ncols() != dim {
            return Err(TagError::Length {
                expected: dim,
                found: tags.ncols(),
            });
        }
        Ok(tags.to_owned())
    }
}

impl SitePositions for LatticeTags {
    fn pos(&self, tag: &[i64]) -> Array1<f64> {
        let tag = Array1::from_iter(tag.iter().map(|&t| t as f64));
        tag.dot(&self.prim_vecs) + &self.offset
    }

    fn positions(&self, tags: ArrayView2<'_, i64>) -> Array2<f64> {
        tags.mapv(|t| t as f64).dot(&self.prim_vecs) + &self.offset
    }
}
