use crate::dex::DexMethod;
use crate::treelist::TreeList;
use crate::typeinference::array_types::ArrayType;
use crate::typeinference::scalars::Scalars;

fn and_scalars(a: &Scalars, b: &Scalars) -> Scalars {
    *a & *b
}

fn or_bool(a: &bool, b: &bool) -> bool {
    *a || *b
}

/// Type state of every register at one program point.
///
/// All operations return a new `TypeInfo`; the underlying lists share
/// structure, so a transfer touching one register copies one path per list.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub prims: TreeList<Scalars>,
    pub arrays: TreeList<ArrayType>,
    pub tainted: TreeList<bool>,
}

impl TypeInfo {
    pub fn new() -> Self {
        TypeInfo {
            prims: TreeList::new(Scalars::INVALID, and_scalars),
            arrays: TreeList::new(ArrayType::Invalid, ArrayType::merge),
            tainted: TreeList::new(false, or_bool),
        }
    }

    /// Entry state: parameters occupy the last registers of the frame.
    pub fn from_params(method: &DexMethod, num_regs: usize) -> Self {
        let params = method.id.spaced_param_types(method.is_static());
        let offset = num_regs.saturating_sub(params.len());
        let mut info = TypeInfo::new();
        for (i, desc) in params.iter().enumerate() {
            if let Some(desc) = desc {
                info.prims.set(offset + i, Scalars::from_desc(desc));
                info.arrays.set(offset + i, ArrayType::from_desc(desc));
            }
        }
        info
    }

    pub fn prim(&self, reg: usize) -> Scalars {
        *self.prims.get(reg)
    }

    pub fn array(&self, reg: usize) -> &ArrayType {
        self.arrays.get(reg)
    }

    pub fn is_tainted(&self, reg: usize) -> bool {
        *self.tainted.get(reg)
    }

    fn set(&mut self, reg: usize, st: Scalars, at: ArrayType, taint: bool) {
        self.prims.set(reg, st);
        self.arrays.set(reg, at);
        self.tainted.set(reg, taint);
    }

    pub fn assign(&self, reg: usize, st: Scalars, at: ArrayType, taint: bool) -> TypeInfo {
        let mut next = self.clone();
        next.set(reg, st, at, taint);
        next
    }

    pub fn assign_plain(&self, reg: usize, st: Scalars) -> TypeInfo {
        self.assign(reg, st, ArrayType::Invalid, false)
    }

    /// Wide value: the upper register becomes unusable on its own.
    pub fn assign2(&self, reg: usize, st: Scalars) -> TypeInfo {
        let mut next = self.clone();
        next.set(reg, st, ArrayType::Invalid, false);
        next.set(reg + 1, Scalars::INVALID, ArrayType::Invalid, false);
        next
    }

    pub fn assign_from_desc(&self, reg: usize, desc: &str) -> TypeInfo {
        let st = Scalars::from_desc(desc);
        if st.is_wide() {
            self.assign2(reg, st)
        } else {
            self.assign(reg, st, ArrayType::from_desc(desc), false)
        }
    }

    pub fn move_reg(&self, src: usize, dest: usize, wide: bool) -> TypeInfo {
        let mut next = self.clone();
        next.set(dest, self.prim(src), self.array(src).clone(), self.is_tainted(src));
        if wide {
            next.set(dest + 1, self.prim(src + 1), self.array(src + 1).clone(), self.is_tainted(src + 1));
        }
        next
    }

    /// Pointwise merge, or `None` when `other` adds nothing to `self`.
    pub fn merge(&self, other: &TypeInfo) -> Option<TypeInfo> {
        let merged = TypeInfo {
            prims: self.prims.merge(&other.prims),
            arrays: self.arrays.merge(&other.arrays),
            tainted: self.tainted.merge(&other.tainted),
        };
        if merged == *self {
            None
        } else {
            Some(merged)
        }
    }
}

impl Default for TypeInfo {
    fn default() -> Self {
        TypeInfo::new()
    }
}
