//! Object store holding real-valued vectors and their associations.
//!
//! [`Database`] is the contract every analysis component is written against;
//! [`InMemoryDatabase`] is an exhaustive-search implementation of it.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::distance::DistanceFunction;
use crate::label::ClassLabel;
use crate::preprocessing::PreferenceVector;
use crate::KddError;

/// Stable identifier of a stored object.
pub type ObjectId = usize;

/// Immutable vector of real-valued coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealVector {
    values: Vec<f64>,
}

impl RealVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn dimensionality(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl From<Vec<f64>> for RealVector {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl Index<usize> for RealVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.values[index]
    }
}

/// Keys under which associations are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssociationId {
    /// Free-text label of an object.
    Label,
    /// Class membership of an object.
    Class,
    /// Subspace preference vector of an object.
    PreferenceVector,
    /// Local correlation dimensionality of an object.
    LocalDimensionality,
}

impl fmt::Display for AssociationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssociationId::Label => "label",
            AssociationId::Class => "class",
            AssociationId::PreferenceVector => "preference vector",
            AssociationId::LocalDimensionality => "local dimensionality",
        };
        f.write_str(name)
    }
}

/// Typed value layered on top of an object's coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Association {
    Label(String),
    Class(ClassLabel),
    PreferenceVector(PreferenceVector),
    LocalDimensionality(usize),
}

impl Association {
    /// Key this value is stored under.
    pub fn id(&self) -> AssociationId {
        match self {
            Association::Label(_) => AssociationId::Label,
            Association::Class(_) => AssociationId::Class,
            Association::PreferenceVector(_) => AssociationId::PreferenceVector,
            Association::LocalDimensionality(_) => AssociationId::LocalDimensionality,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            Association::Label(label) => Some(label),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassLabel> {
        match self {
            Association::Class(label) => Some(label),
            _ => None,
        }
    }

    pub fn as_preference_vector(&self) -> Option<&PreferenceVector> {
        match self {
            Association::PreferenceVector(vector) => Some(vector),
            _ => None,
        }
    }

    pub fn as_local_dimensionality(&self) -> Option<usize> {
        match self {
            Association::LocalDimensionality(dim) => Some(*dim),
            _ => None,
        }
    }
}

/// Neighbor returned by a similarity query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryResult {
    pub id: ObjectId,
    pub distance: f64,
}

/// Contract of an object store with similarity queries.
///
/// Query results are ordered by ascending distance; equal distances are
/// ordered by ascending object id. A query for a stored id includes that
/// object itself at distance zero.
pub trait Database {
    /// Number of stored objects.
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Ids of all stored objects in stable iteration order.
    fn ids(&self) -> Vec<ObjectId>;

    /// Dimensionality shared by all objects, `None` while the store is empty.
    fn dimensionality(&self) -> Option<usize>;

    fn get(&self, id: ObjectId) -> Result<&RealVector, KddError>;

    /// Store `association` for `id`, replacing any previous value under the same key.
    fn associate(&mut self, id: ObjectId, association: Association) -> Result<(), KddError>;

    fn association(&self, key: AssociationId, id: ObjectId)
        -> Result<Option<&Association>, KddError>;

    /// Whether `key` is set for every stored object.
    fn is_set(&self, key: AssociationId) -> bool;

    fn knn_query_for_id(
        &self,
        id: ObjectId,
        k: usize,
        distance: &dyn DistanceFunction,
    ) -> Result<Vec<QueryResult>, KddError>;

    /// Same contract as [`Database::knn_query_for_id`] for an object that need not be stored.
    fn knn_query_for_object(
        &self,
        object: &RealVector,
        k: usize,
        distance: &dyn DistanceFunction,
    ) -> Result<Vec<QueryResult>, KddError>;

    /// All objects within `epsilon` (inclusive) of the object with `id`.
    fn range_query_for_id(
        &self,
        id: ObjectId,
        epsilon: f64,
        distance: &dyn DistanceFunction,
    ) -> Result<Vec<QueryResult>, KddError>;

    /// Class label of `id`, failing when it was never associated.
    fn class_label(&self, id: ObjectId) -> Result<&ClassLabel, KddError> {
        self.association(AssociationId::Class, id)?
            .and_then(Association::as_class)
            .ok_or(KddError::MissingAssociation {
                key: AssociationId::Class,
                id,
            })
    }
}

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    id: ObjectId,
    distance: f64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// In-memory store answering queries by exhaustive search.
///
/// Objects iterate in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
    dim: Option<usize>,
    order: Vec<ObjectId>,
    objects: HashMap<ObjectId, RealVector>,
    associations: HashMap<AssociationId, HashMap<ObjectId, Association>>,
    next_id: ObjectId,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a database from vectors, assigning ids `0..n` in order.
    pub fn from_vectors<I, V>(vectors: I) -> Result<Self, KddError>
    where
        I: IntoIterator<Item = V>,
        V: Into<RealVector>,
    {
        let mut database = Self::new();
        for vector in vectors {
            database.insert(vector.into())?;
        }
        Ok(database)
    }

    /// Copy the objects with `ids`, together with all their associations, out
    /// of `source`. Ids are preserved and the given order becomes the
    /// iteration order.
    pub fn subset(source: &dyn Database, ids: &[ObjectId]) -> Result<Self, KddError> {
        const KEYS: [AssociationId; 4] = [
            AssociationId::Label,
            AssociationId::Class,
            AssociationId::PreferenceVector,
            AssociationId::LocalDimensionality,
        ];

        let mut database = Self::new();
        for &id in ids {
            database.insert_with_id(id, source.get(id)?.clone())?;
            for key in KEYS {
                if let Some(association) = source.association(key, id)? {
                    database.associate(id, association.clone())?;
                }
            }
        }
        Ok(database)
    }

    /// Insert a vector under the next free id and return that id.
    pub fn insert(&mut self, vector: RealVector) -> Result<ObjectId, KddError> {
        let id = self.next_id;
        self.insert_with_id(id, vector)?;
        Ok(id)
    }

    pub fn insert_with_id(&mut self, id: ObjectId, vector: RealVector) -> Result<(), KddError> {
        match self.dim {
            Some(expected) if expected != vector.dimensionality() => {
                return Err(KddError::DimensionMismatch {
                    expected,
                    got: vector.dimensionality(),
                });
            }
            _ => {}
        }
        if self.objects.contains_key(&id) {
            return Err(KddError::DuplicateObject(id));
        }
        self.dim = Some(vector.dimensionality());
        self.objects.insert(id, vector);
        self.order.push(id);
        // Once usize::MAX is taken, `insert` keeps proposing it and fails.
        self.next_id = self.next_id.max(id.saturating_add(1));
        Ok(())
    }

    fn check_dimensionality(&self, object: &RealVector) -> Result<(), KddError> {
        match self.dim {
            Some(expected) if expected != object.dimensionality() => {
                Err(KddError::DimensionMismatch {
                    expected,
                    got: object.dimensionality(),
                })
            }
            _ => Ok(()),
        }
    }

    fn knn(
        &self,
        query: &RealVector,
        k: usize,
        distance: &dyn DistanceFunction,
    ) -> Vec<QueryResult> {
        if k == 0 {
            return Vec::new();
        }
        let mut heap: BinaryHeap<HeapEntry> =
            BinaryHeap::with_capacity(k.min(self.order.len()) + 1);
        for &id in &self.order {
            let candidate = HeapEntry {
                id,
                distance: distance.distance(query, &self.objects[&id]),
            };
            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(worst) = heap.peek() {
                if candidate < *worst {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }
        heap.into_sorted_vec()
            .into_iter()
            .map(|entry| QueryResult {
                id: entry.id,
                distance: entry.distance,
            })
            .collect()
    }
}

impl Database for InMemoryDatabase {
    fn size(&self) -> usize {
        self.order.len()
    }

    fn ids(&self) -> Vec<ObjectId> {
        self.order.clone()
    }

    fn dimensionality(&self) -> Option<usize> {
        self.dim
    }

    fn get(&self, id: ObjectId) -> Result<&RealVector, KddError> {
        self.objects.get(&id).ok_or(KddError::UnknownObject(id))
    }

    fn associate(&mut self, id: ObjectId, association: Association) -> Result<(), KddError> {
        if !self.objects.contains_key(&id) {
            return Err(KddError::UnknownObject(id));
        }
        self.associations
            .entry(association.id())
            .or_default()
            .insert(id, association);
        Ok(())
    }

    fn association(
        &self,
        key: AssociationId,
        id: ObjectId,
    ) -> Result<Option<&Association>, KddError> {
        if !self.objects.contains_key(&id) {
            return Err(KddError::UnknownObject(id));
        }
        Ok(self
            .associations
            .get(&key)
            .and_then(|values| values.get(&id)))
    }

    fn is_set(&self, key: AssociationId) -> bool {
        match self.associations.get(&key) {
            Some(values) => self.order.iter().all(|id| values.contains_key(id)),
            None => self.order.is_empty(),
        }
    }

    fn knn_query_for_id(
        &self,
        id: ObjectId,
        k: usize,
        distance: &dyn DistanceFunction,
    ) -> Result<Vec<QueryResult>, KddError> {
        let query = self.get(id)?;
        Ok(self.knn(query, k, distance))
    }

    fn knn_query_for_object(
        &self,
        object: &RealVector,
        k: usize,
        distance: &dyn DistanceFunction,
    ) -> Result<Vec<QueryResult>, KddError> {
        self.check_dimensionality(object)?;
        Ok(self.knn(object, k, distance))
    }

    fn range_query_for_id(
        &self,
        id: ObjectId,
        epsilon: f64,
        distance: &dyn DistanceFunction,
    ) -> Result<Vec<QueryResult>, KddError> {
        let query = self.get(id)?;
        let mut hits: Vec<HeapEntry> = self
            .order
            .iter()
            .map(|&candidate| HeapEntry {
                id: candidate,
                distance: distance.distance(query, &self.objects[&candidate]),
            })
            .filter(|entry| entry.distance <= epsilon)
            .collect();
        hits.sort();
        Ok(hits
            .into_iter()
            .map(|entry| QueryResult {
                id: entry.id,
                distance: entry.distance,
            })
            .collect())
    }
}
