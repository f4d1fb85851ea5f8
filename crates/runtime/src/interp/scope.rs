//! Variable scopes and storage places.

use indexmap::IndexMap;

use jac_foundation::{ElementId, Value};
use jac_vm::{MachineContext, Operand, Place};

use super::Interp;
use crate::error::{Error, Result};

/// Locals of one running code block, plus the element whose context
/// variables resolve by bare name.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub locals: IndexMap<String, Value>,
    pub has_obj: Option<ElementId>,
}

impl Scope {
    pub fn new(has_obj: Option<ElementId>) -> Self {
        Self {
            locals: IndexMap::new(),
            has_obj,
        }
    }

    pub fn with_local(mut self, name: &str, value: Value) -> Self {
        self.locals.insert(name.to_string(), value);
        self
    }
}

/// Normalise a possibly negative list index.
pub(crate) fn list_index(len: usize, key: &Value) -> Result<usize> {
    let Some(i) = key.as_int() else {
        return Err(Error::rt(format!(
            "List indices must be int, not {}",
            key.type_name()
        )));
    };
    let at = if i < 0 { len as i64 + i } else { i };
    if at < 0 || at >= len as i64 {
        return Err(Error::rt(format!("List index {i} out of range")));
    }
    Ok(at as usize)
}

fn dict_key(key: &Value) -> Result<&str> {
    key.as_str()
        .ok_or_else(|| Error::rt(format!("Key is not str type : {}!", key.type_name())))
}

/// `container[key]`, with missing dict keys reading as null.
pub(crate) fn get_item(container: &Value, key: &Value) -> Result<Value> {
    match container {
        Value::List(items) => Ok(items[list_index(items.len(), key)?].clone()),
        Value::Dict(map) => Ok(map.get(dict_key(key)?).cloned().unwrap_or_default()),
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            Ok(Value::Str(chars[list_index(chars.len(), key)?].to_string()))
        }
        other => Err(Error::rt(format!("{} is not subscriptable", other.type_name()))),
    }
}

fn set_item(container: &mut Value, key: &Value, value: Value) -> Result<()> {
    match container {
        Value::List(items) => {
            let at = list_index(items.len(), key)?;
            items[at] = value;
        }
        Value::Dict(map) => {
            map.insert(dict_key(key)?.to_string(), value);
        }
        other => {
            return Err(Error::rt(format!(
                "{} does not support item assignment",
                other.type_name()
            )))
        }
    }
    Ok(())
}

fn remove_item(container: &mut Value, key: &Value) -> Result<()> {
    match container {
        Value::List(items) => {
            let at = list_index(items.len(), key)?;
            items.remove(at);
        }
        Value::Dict(map) => {
            let name = dict_key(key)?;
            if map.shift_remove(name).is_none() {
                return Err(Error::rt(format!("Key {name} not found")));
            }
        }
        other => {
            return Err(Error::rt(format!(
                "{} does not support item deletion",
                other.type_name()
            )))
        }
    }
    Ok(())
}

impl Interp<'_> {
    /// Whether `name` resolves as a local or a context variable.
    pub(crate) fn is_variable(&mut self, name: &str) -> bool {
        if self.scope().locals.contains_key(name) {
            return true;
        }
        match self.scope().has_obj {
            Some(owner) => self
                .context_of(owner)
                .map(|ctx| ctx.contains_key(name))
                .unwrap_or(false),
            None => false,
        }
    }

    pub(crate) fn lookup(&mut self, name: &str, create: bool) -> Result<Operand> {
        if let Some(value) = self.scope().locals.get(name) {
            return Ok(Operand::at(value.clone(), Place::Local(name.to_string())));
        }
        if let Some(owner) = self.scope().has_obj {
            if let Some(value) = self.context_of(owner)?.get(name) {
                return Ok(Operand::at(
                    value.clone(),
                    Place::Field {
                        owner,
                        name: name.to_string(),
                    },
                ));
            }
        }
        if create {
            self.scope_mut()
                .locals
                .insert(name.to_string(), Value::Null);
            return Ok(Operand::at(Value::Null, Place::Local(name.to_string())));
        }
        Err(Error::rt(format!("Variable not defined - {name}")))
    }

    /// Bind a local (or context variable of the scope owner) by name.
    pub(crate) fn bind(&mut self, name: &str, value: Value) -> Result<()> {
        let dest = self.lookup(name, true)?;
        self.assign(dest, Operand::value(value))?;
        Ok(())
    }

    pub(crate) fn read_place(&mut self, place: &Place) -> Result<Value> {
        match place {
            Place::Local(name) => Ok(self.scope().locals.get(name).cloned().unwrap_or_default()),
            Place::Global(name) => Ok(self.globals.get(name).cloned().unwrap_or_default()),
            Place::Field { owner, name } => {
                Ok(self.context_of(*owner)?.get(name).cloned().unwrap_or_default())
            }
            Place::Index { base, key } => {
                let container = self.read_place(base)?;
                get_item(&container, key)
            }
        }
    }

    pub(crate) fn write_place(&mut self, place: &Place, value: Value) -> Result<()> {
        match place {
            Place::Local(name) => {
                self.scope_mut().locals.insert(name.clone(), value);
                Ok(())
            }
            Place::Global(name) => {
                self.globals.insert(name.clone(), value);
                Ok(())
            }
            Place::Field { owner, name } => self.write_field(*owner, name, value, false),
            Place::Index { base, key } => {
                let mut container = self.read_place(base)?;
                set_item(&mut container, key, value)?;
                self.write_place(base, container)
            }
        }
    }

    /// Set a context field. Unless `force`d, the field must already exist or
    /// be declared by the element's architype.
    pub(crate) fn write_field(
        &mut self,
        owner: ElementId,
        name: &str,
        value: Value,
        force: bool,
    ) -> Result<()> {
        let mut element = self.element(owner)?;
        if !force && !element.context.contains_key(name) && !self.declares(&element, name)? {
            return Err(Error::rt(format!(
                "Creating variable {name} in graph element {} is not allowed, please define",
                element.name
            )));
        }
        element.context.insert(name.to_string(), value);
        self.save_element(element)
    }

    /// Remove the storage behind `place` (`destroy x`).
    pub(crate) fn delete_place(&mut self, place: &Place) -> Result<()> {
        match place {
            Place::Local(name) => match self.scope_mut().locals.shift_remove(name) {
                Some(_) => Ok(()),
                None => Err(Error::rt(format!("Variable not defined - {name}"))),
            },
            Place::Global(name) => {
                self.globals.shift_remove(name);
                Ok(())
            }
            Place::Field { owner, name } => {
                let element = self.element(*owner)?;
                Err(Error::rt(format!(
                    "Deleting {name} in graph element {} is not allowed, try setting to null",
                    element.name
                )))
            }
            Place::Index { base, key } => {
                let mut container = self.read_place(base)?;
                remove_item(&mut container, key)?;
                self.write_place(base, container)
            }
        }
    }
}

impl MachineContext for Interp<'_> {
    type Error = Error;

    fn load_variable(&mut self, name: &str, create: bool) -> Result<Operand> {
        self.lookup(name, create)
    }

    fn assign(&mut self, dest: Operand, src: Operand) -> Result<Operand> {
        let Some(place) = dest.place else {
            return Err(Error::rt(format!(
                "Unable to assign to a {} value",
                dest.value.type_name()
            )));
        };
        self.write_place(&place, src.value.clone())?;
        Ok(Operand::at(src.value, place))
    }

    /// `dest := src`: copy matching context fields onto an element, or merge
    /// into a dict.
    fn copy_fields(&mut self, dest: Operand, src: Operand) -> Result<Operand> {
        let fields = match &src.value {
            Value::Element(id) => self.context_of(*id)?,
            Value::Dict(map) => map.clone(),
            other => {
                return Err(Error::rt(format!(
                    "Cannot copy fields from a {}",
                    other.type_name()
                )))
            }
        };
        match &dest.value {
            Value::Element(id) => {
                let mut element = self.element(*id)?;
                for (name, value) in fields {
                    if element.context.contains_key(&name) {
                        element.context.insert(name, value);
                    }
                }
                self.save_element(element)?;
                Ok(dest)
            }
            Value::Dict(map) => {
                let mut merged = map.clone();
                merged.extend(fields);
                self.assign(dest, Operand::value(Value::Dict(merged)))
            }
            other => Err(Error::rt(format!(
                "Cannot copy fields into a {}",
                other.type_name()
            ))),
        }
    }

    fn set_location(&mut self, line: u32, file: Option<&str>) {
        self.loc.line = line;
        if let Some(file) = file {
            self.loc.file = file.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::Harness;
    use super::*;

    #[test]
    fn test_lookup_order_and_create() {
        let mut h = Harness::new();
        let mut interp = h.interp();
        interp.scope_mut().locals.insert("x".into(), Value::Int(1));
        let found = interp.lookup("x", false).unwrap();
        assert_eq!(found.place, Some(Place::Local("x".into())));
        assert!(interp.lookup("y", false).is_err());
        let created = interp.lookup("y", true).unwrap();
        assert_eq!(created.value, Value::Null);
        assert!(interp.scope().locals.contains_key("y"));
    }

    #[test]
    fn test_nested_index_write_back() {
        let mut h = Harness::new();
        let mut interp = h.interp();
        let mut inner = IndexMap::new();
        inner.insert("k".to_string(), Value::List(vec![Value::Int(1), Value::Int(2)]));
        interp.scope_mut().locals.insert("d".into(), Value::Dict(inner));
        let place = Place::Index {
            base: Box::new(Place::Index {
                base: Box::new(Place::Local("d".into())),
                key: Value::str("k"),
            }),
            key: Value::Int(-1),
        };
        interp.write_place(&place, Value::Int(9)).unwrap();
        assert_eq!(interp.read_place(&place).unwrap(), Value::Int(9));
        interp.delete_place(&place).unwrap();
        let d = interp.scope().locals["d"].as_dict().unwrap().clone();
        assert_eq!(d["k"], Value::List(vec![Value::Int(1)]));
    }

    #[test]
    fn test_list_index_bounds() {
        assert_eq!(list_index(3, &Value::Int(-1)).unwrap(), 2);
        assert!(list_index(3, &Value::Int(3)).is_err());
        assert!(list_index(3, &Value::str("a")).is_err());
    }
}
