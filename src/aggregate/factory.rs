use std::{collections::HashMap, fmt, sync::Arc};

use arrow::datatypes::DataType;

use super::{
    any::Any,
    group_array::{GroupArrayArray, GroupUniqArrayArray},
    min_max::{MinMax, MinMaxKind},
    sum::SumWithOverflow,
    sum_map::SumMapWithOverflow,
    AggregateError, AggregateFunction, SUM_MAP_WITH_OVERFLOW, SUM_WITH_OVERFLOW,
};

/// Resolves a function for a list of argument types.
pub type FunctionBuilder = Arc<
    dyn Fn(&[DataType]) -> Result<Arc<dyn AggregateFunction>, AggregateError> + Send + Sync,
>;

/// Name-keyed registry of aggregate functions.
#[derive(Clone)]
pub struct AggregateFunctionFactory {
    functions: HashMap<String, FunctionBuilder>,
}

impl AggregateFunctionFactory {
    /// A factory without any function.
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// A factory holding the built-in functions.
    pub fn with_builtins() -> Self {
        let mut factory = Self::empty();
        factory.register(SUM_WITH_OVERFLOW, |args| {
            Ok(Arc::new(SumWithOverflow::try_new(args)?) as Arc<dyn AggregateFunction>)
        });
        factory.register(SUM_MAP_WITH_OVERFLOW, |args| {
            Ok(Arc::new(SumMapWithOverflow::try_new(args)?) as Arc<dyn AggregateFunction>)
        });
        factory.register("min", |args| {
            Ok(Arc::new(MinMax::try_new(MinMaxKind::Min, args)?) as Arc<dyn AggregateFunction>)
        });
        factory.register("max", |args| {
            Ok(Arc::new(MinMax::try_new(MinMaxKind::Max, args)?) as Arc<dyn AggregateFunction>)
        });
        factory.register("any", |args| {
            Ok(Arc::new(Any::try_new(false, args)?) as Arc<dyn AggregateFunction>)
        });
        factory.register("anyLast", |args| {
            Ok(Arc::new(Any::try_new(true, args)?) as Arc<dyn AggregateFunction>)
        });
        factory.register("groupArrayArray", |args| {
            Ok(Arc::new(GroupArrayArray::try_new(args)?) as Arc<dyn AggregateFunction>)
        });
        factory.register("groupUniqArrayArray", |args| {
            Ok(Arc::new(GroupUniqArrayArray::try_new(args)?) as Arc<dyn AggregateFunction>)
        });
        factory
    }

    /// Registers (or replaces) a function under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn(&[DataType]) -> Result<Arc<dyn AggregateFunction>, AggregateError>
            + Send
            + Sync
            + 'static,
    {
        self.functions.insert(name.into(), Arc::new(builder));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Binds `name` to `arguments`.
    pub fn get(
        &self,
        name: &str,
        arguments: &[DataType],
    ) -> Result<Arc<dyn AggregateFunction>, AggregateError> {
        let builder = self
            .functions
            .get(name)
            .ok_or_else(|| AggregateError::UnknownFunction(name.to_owned()))?;
        builder(arguments)
    }
}

impl Default for AggregateFunctionFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for AggregateFunctionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.functions.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("AggregateFunctionFactory")
            .field("functions", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_builtins_by_name() {
        let factory = AggregateFunctionFactory::default();
        let sum = factory.get(SUM_WITH_OVERFLOW, &[DataType::Int64]).unwrap();
        assert_eq!(sum.name(), SUM_WITH_OVERFLOW);
        assert_eq!(sum.return_type(), &DataType::Int64);
        assert!(matches!(
            factory.get("median", &[DataType::Int64]),
            Err(AggregateError::UnknownFunction(name)) if name == "median"
        ));
    }

    #[test]
    fn registered_functions_override_builtins() {
        let mut factory = AggregateFunctionFactory::default();
        factory.register(SUM_WITH_OVERFLOW, |args| {
            Ok(Arc::new(MinMax::try_new(MinMaxKind::Max, args)?) as Arc<dyn AggregateFunction>)
        });
        let bound = factory.get(SUM_WITH_OVERFLOW, &[DataType::Int32]).unwrap();
        assert_eq!(bound.name(), "max");
    }
}
