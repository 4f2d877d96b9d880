//! Reference implementation of the runtime's memory blocks.
//!
//! Every block owns one counter. A block starts at zero and sits in the fresh
//! table until its first retain; `reclaim` frees whatever is still fresh.
//! Releasing a block to zero frees it at once and releases its children.

use std::collections::BTreeSet;

use thiserror::Error;

use super::abi::{KIND_BOOL, KIND_FLOAT, KIND_INT, KIND_PTR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u32);

/// One 8-byte slot of a block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Word {
    Int(i64),
    Float(f64),
    Bool(bool),
    Ref(Handle),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Unknown,
    Int,
    Float,
    Bool,
    Ptr,
}

impl ElementKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            KIND_INT => ElementKind::Int,
            KIND_FLOAT => ElementKind::Float,
            KIND_BOOL => ElementKind::Bool,
            KIND_PTR => ElementKind::Ptr,
            _ => ElementKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    List { kind: ElementKind, elements: Vec<Word> },
    /// Entries keep insertion order.
    Dict { kind: ElementKind, entries: Vec<(String, Word)> },
    Record { fields: Vec<Word> },
}

#[derive(Debug, Clone, PartialEq)]
struct Cell {
    count: u32,
    payload: Payload,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub allocations: usize,
    pub retains: usize,
    pub releases: usize,
    pub frees: usize,
    /// Highest count any single block reached.
    pub peak_count: u32,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HeapError {
    #[error("block {0} used after it was freed")]
    UseAfterFree(u32),
    #[error("block {0} released more often than retained")]
    Underflow(u32),
    #[error("null pointer passed to {0}")]
    NullPointer(&'static str),
    #[error("block {handle} is not a {expected}")]
    WrongPayload { handle: u32, expected: &'static str },
    #[error("slot {index} out of range for block {handle}")]
    OutOfRange { handle: u32, index: usize },
    /// A failure of the running program itself, which exits with status 1.
    #[error("{0}")]
    Trap(String),
}

#[derive(Debug, Default)]
pub struct Heap {
    cells: Vec<Option<Cell>>,
    fresh: BTreeSet<Handle>,
    stats: HeapStats,
}

impl Heap {
    pub fn new() -> Self {
        Heap::default()
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    pub fn live_blocks(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        matches!(self.cells.get(handle.0 as usize), Some(Some(_)))
    }

    pub fn count(&self, handle: Handle) -> Option<u32> {
        self.cell(handle).ok().map(|cell| cell.count)
    }

    pub fn alloc(&mut self, payload: Payload) -> Handle {
        let handle = Handle(self.cells.len() as u32);
        self.cells.push(Some(Cell { count: 0, payload }));
        self.fresh.insert(handle);
        self.stats.allocations += 1;
        handle
    }

    /// A record of `fields` null slots.
    pub fn alloc_record(&mut self, fields: usize) -> Handle {
        self.alloc(Payload::Record {
            fields: vec![Word::Null; fields],
        })
    }

    pub fn alloc_text(&mut self, text: String) -> Handle {
        self.alloc(Payload::Text(text))
    }

    fn cell(&self, handle: Handle) -> Result<&Cell, HeapError> {
        match self.cells.get(handle.0 as usize) {
            Some(Some(cell)) => Ok(cell),
            _ => Err(HeapError::UseAfterFree(handle.0)),
        }
    }

    fn cell_mut(&mut self, handle: Handle) -> Result<&mut Cell, HeapError> {
        match self.cells.get_mut(handle.0 as usize) {
            Some(Some(cell)) => Ok(cell),
            _ => Err(HeapError::UseAfterFree(handle.0)),
        }
    }

    pub fn payload(&self, handle: Handle) -> Result<&Payload, HeapError> {
        self.cell(handle).map(|cell| &cell.payload)
    }

    pub fn payload_mut(&mut self, handle: Handle) -> Result<&mut Payload, HeapError> {
        self.cell_mut(handle).map(|cell| &mut cell.payload)
    }

    pub fn retain(&mut self, handle: Handle) -> Result<u32, HeapError> {
        let cell = self.cell_mut(handle)?;
        cell.count += 1;
        let count = cell.count;

        self.fresh.remove(&handle);
        self.stats.retains += 1;
        self.stats.peak_count = self.stats.peak_count.max(count);
        Ok(count)
    }

    pub fn release(&mut self, handle: Handle) -> Result<u32, HeapError> {
        let cell = self.cell_mut(handle)?;
        if cell.count == 0 {
            return Err(HeapError::Underflow(handle.0));
        }
        cell.count -= 1;
        let count = cell.count;

        self.stats.releases += 1;
        if count == 0 {
            self.free(handle)?;
        }
        Ok(count)
    }

    fn free(&mut self, handle: Handle) -> Result<(), HeapError> {
        let Some(cell) = self
            .cells
            .get_mut(handle.0 as usize)
            .and_then(Option::take)
        else {
            return Err(HeapError::UseAfterFree(handle.0));
        };

        self.fresh.remove(&handle);
        self.stats.frees += 1;

        let children: Vec<Handle> = match &cell.payload {
            Payload::Text(_) => vec![],
            Payload::List { elements, .. } => refs(elements.iter()),
            Payload::Dict { entries, .. } => refs(entries.iter().map(|(_, word)| word)),
            Payload::Record { fields } => refs(fields.iter()),
        };

        for child in children {
            self.release(child)?;
        }
        Ok(())
    }

    /// Frees every block that was never retained.
    pub fn reclaim(&mut self) -> Result<usize, HeapError> {
        let fresh = std::mem::take(&mut self.fresh);
        let mut freed = 0;

        for handle in fresh {
            if self.count(handle) == Some(0) {
                self.free(handle)?;
                freed += 1;
            }
        }

        Ok(freed)
    }

    pub fn text(&self, handle: Handle) -> Result<&str, HeapError> {
        match self.payload(handle)? {
            Payload::Text(text) => Ok(text),
            _ => Err(HeapError::WrongPayload {
                handle: handle.0,
                expected: "text",
            }),
        }
    }

    pub fn list(&self, handle: Handle) -> Result<&Vec<Word>, HeapError> {
        match self.payload(handle)? {
            Payload::List { elements, .. } => Ok(elements),
            _ => Err(HeapError::WrongPayload {
                handle: handle.0,
                expected: "list",
            }),
        }
    }

    pub fn list_mut(&mut self, handle: Handle) -> Result<&mut Vec<Word>, HeapError> {
        match self.payload_mut(handle)? {
            Payload::List { elements, .. } => Ok(elements),
            _ => Err(HeapError::WrongPayload {
                handle: handle.0,
                expected: "list",
            }),
        }
    }

    pub fn dict(&self, handle: Handle) -> Result<&Vec<(String, Word)>, HeapError> {
        match self.payload(handle)? {
            Payload::Dict { entries, .. } => Ok(entries),
            _ => Err(HeapError::WrongPayload {
                handle: handle.0,
                expected: "dict",
            }),
        }
    }

    pub fn dict_mut(&mut self, handle: Handle) -> Result<&mut Vec<(String, Word)>, HeapError> {
        match self.payload_mut(handle)? {
            Payload::Dict { entries, .. } => Ok(entries),
            _ => Err(HeapError::WrongPayload {
                handle: handle.0,
                expected: "dict",
            }),
        }
    }

    pub fn field(&self, handle: Handle, index: usize) -> Result<Word, HeapError> {
        match self.payload(handle)? {
            Payload::Record { fields } => fields.get(index).copied().ok_or(HeapError::OutOfRange {
                handle: handle.0,
                index,
            }),
            _ => Err(HeapError::WrongPayload {
                handle: handle.0,
                expected: "record",
            }),
        }
    }

    /// Plain store; the generated code does its own retain and release.
    pub fn set_field(&mut self, handle: Handle, index: usize, word: Word) -> Result<(), HeapError> {
        match self.payload_mut(handle)? {
            Payload::Record { fields } => match fields.get_mut(index) {
                Some(slot) => {
                    *slot = word;
                    Ok(())
                }
                None => Err(HeapError::OutOfRange {
                    handle: handle.0,
                    index,
                }),
            },
            _ => Err(HeapError::WrongPayload {
                handle: handle.0,
                expected: "record",
            }),
        }
    }

    /// Stores an element, releasing the one it replaces.
    pub fn list_set(&mut self, handle: Handle, index: i64, word: Word) -> Result<(), HeapError> {
        let elements = self.list_mut(handle)?;
        let Some(position) = normalize(index, elements.len()) else {
            return Err(HeapError::OutOfRange {
                handle: handle.0,
                index: index.unsigned_abs() as usize,
            });
        };

        let old = std::mem::replace(&mut elements[position], word);
        if let Word::Ref(old) = old {
            self.release(old)?;
        }
        Ok(())
    }

    pub fn list_get(&self, handle: Handle, index: i64) -> Result<Word, HeapError> {
        let elements = self.list(handle)?;
        normalize(index, elements.len())
            .map(|position| elements[position])
            .ok_or(HeapError::OutOfRange {
                handle: handle.0,
                index: index.unsigned_abs() as usize,
            })
    }

    pub fn list_check(&self, handle: Handle, index: i64) -> Result<bool, HeapError> {
        Ok(normalize(index, self.list(handle)?.len()).is_some())
    }

    /// Appends an element. A list created without a known element kind takes
    /// the kind of its first element.
    pub fn list_push(&mut self, handle: Handle, word: Word) -> Result<(), HeapError> {
        match self.payload_mut(handle)? {
            Payload::List { kind, elements } => {
                if *kind == ElementKind::Unknown {
                    *kind = word_kind(word);
                }
                elements.push(word);
                Ok(())
            }
            _ => Err(HeapError::WrongPayload {
                handle: handle.0,
                expected: "list",
            }),
        }
    }

    pub fn list_kind(&self, handle: Handle) -> Result<ElementKind, HeapError> {
        match self.payload(handle)? {
            Payload::List { kind, .. } | Payload::Dict { kind, .. } => Ok(*kind),
            _ => Err(HeapError::WrongPayload {
                handle: handle.0,
                expected: "container",
            }),
        }
    }

    /// Takes the last element; ownership of its reference moves to the caller.
    pub fn list_pop(&mut self, handle: Handle) -> Result<Word, HeapError> {
        self.list_mut(handle)?
            .pop()
            .ok_or_else(|| HeapError::Trap(String::from("IndexError: pop from empty list")))
    }

    pub fn dict_get(&self, handle: Handle, key: &str) -> Result<Option<Word>, HeapError> {
        Ok(self
            .dict(handle)?
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, word)| *word))
    }

    /// Stores an entry, releasing the value it replaces.
    pub fn dict_set(&mut self, handle: Handle, key: &str, word: Word) -> Result<(), HeapError> {
        let entries = self.dict_mut(handle)?;

        let old = match entries.iter_mut().find(|(existing, _)| existing == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, word)),
            None => {
                entries.push((key.to_string(), word));
                None
            }
        };

        if let Some(Word::Ref(old)) = old {
            self.release(old)?;
        }
        Ok(())
    }

    /// Display form used by `print` and `str` on containers.
    pub fn display(&self, word: Word, nested: bool) -> Result<String, HeapError> {
        Ok(match word {
            Word::Int(value) => value.to_string(),
            Word::Float(value) => format_float(value),
            Word::Bool(true) => String::from("True"),
            Word::Bool(false) => String::from("False"),
            Word::Null => String::from("None"),
            Word::Ref(handle) => match self.payload(handle)? {
                Payload::Text(text) if nested => format!("'{}'", text),
                Payload::Text(text) => text.clone(),
                Payload::List { elements, .. } => {
                    let items = elements
                        .iter()
                        .map(|element| self.display(*element, true))
                        .collect::<Result<Vec<_>, _>>()?;
                    format!("[{}]", items.join(", "))
                }
                Payload::Dict { entries, .. } => {
                    let items = entries
                        .iter()
                        .map(|(key, value)| Ok(format!("'{}': {}", key, self.display(*value, true)?)))
                        .collect::<Result<Vec<_>, HeapError>>()?;
                    format!("{{{}}}", items.join(", "))
                }
                Payload::Record { .. } => String::from("<object>"),
            },
        })
    }
}

fn word_kind(word: Word) -> ElementKind {
    match word {
        Word::Int(_) => ElementKind::Int,
        Word::Float(_) => ElementKind::Float,
        Word::Bool(_) => ElementKind::Bool,
        Word::Ref(_) | Word::Null => ElementKind::Ptr,
    }
}

fn refs<'a>(words: impl Iterator<Item = &'a Word>) -> Vec<Handle> {
    words
        .filter_map(|word| match word {
            Word::Ref(handle) => Some(*handle),
            _ => None,
        })
        .collect()
}

/// Python-style index: negative values count from the end.
fn normalize(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let position = if index < 0 { index + len } else { index };
    (0..len).contains(&position).then_some(position as usize)
}

/// Floats print the way Python shows them: `2.0`, `0.1`, `inf`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        String::from("nan")
    } else if value.is_infinite() {
        String::from(if value > 0.0 { "inf" } else { "-inf" })
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

pub fn floor_div(lhs: i64, rhs: i64) -> Result<i64, HeapError> {
    if rhs == 0 {
        return Err(HeapError::Trap(String::from(
            "ZeroDivisionError: integer division or modulo by zero",
        )));
    }

    let quotient = lhs.wrapping_div(rhs);
    if lhs.wrapping_rem(rhs) != 0 && ((lhs < 0) != (rhs < 0)) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

pub fn floor_mod(lhs: i64, rhs: i64) -> Result<i64, HeapError> {
    let quotient = floor_div(lhs, rhs)?;
    Ok(lhs.wrapping_sub(quotient.wrapping_mul(rhs)))
}

pub fn float_floor_div(lhs: f64, rhs: f64) -> Result<f64, HeapError> {
    if rhs == 0.0 {
        return Err(HeapError::Trap(String::from("ZeroDivisionError: float floor division by zero")));
    }
    Ok((lhs / rhs).floor())
}

pub fn float_mod(lhs: f64, rhs: f64) -> Result<f64, HeapError> {
    if rhs == 0.0 {
        return Err(HeapError::Trap(String::from("ZeroDivisionError: float modulo")));
    }
    Ok(lhs - rhs * (lhs / rhs).floor())
}
